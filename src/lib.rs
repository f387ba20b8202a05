//! SK Market Scout
//!
//! Crawls the sk-ah.com sale history into a local price database and
//! evaluates live auction listings against the historical median price.
//!
//! - [`domain`]: prices, history records, aggregates, verdicts, checkpoints
//! - [`infrastructure`]: configuration, logging, page sources, parsing, storage
//! - [`crawling`]: the batched parallel history crawl and listing pagination
//! - [`application`]: the crawl and evaluation use cases

pub mod application;
pub mod crawling;
pub mod domain;
pub mod infrastructure;
