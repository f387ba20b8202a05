//! # Crawling
//!
//! Pagination over page sources and the batch worker pool that turns history
//! pages into persisted records.

pub mod paginator;
pub mod summary;
pub mod worker_pool;

pub use paginator::{
    HistoryEnd, HistoryPaginator, ListingEnd, ListingPage, ListingPaginator, NavState, PageResult,
};
pub use summary::{CrawlSummary, WorkerReport};
pub use worker_pool::{BatchWorkerPool, CrawlPlan, PageRange, WorkerError};
