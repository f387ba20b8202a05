//! Application layer module
//!
//! Use cases that orchestrate the domain logic over the infrastructure:
//! the history crawl and the live auction evaluation.

pub mod auction_evaluation;
pub mod evaluator;
pub mod history_crawl;

pub use auction_evaluation::{EvaluationReport, ListingCollection, RecommendationTable, collect_listings, render_table, run_auction_evaluation, write_exports};
pub use evaluator::Evaluator;
pub use history_crawl::HistoryCrawl;
