//! Domain module - auction market entities and pure business rules
//!
//! Everything here is synchronous and free of I/O: sale records, live
//! listings, price handling, aggregates, verdicts and crawl checkpoints.

pub mod aggregate;
pub mod checkpoint;
pub mod history;
pub mod listing;
pub mod price;
pub mod recommendation;

pub use aggregate::{ItemAggregate, build_aggregates};
pub use checkpoint::{BatchCheckpoint, CheckpointLedger};
pub use history::{HistoryRecord, ItemHistory, MergeCounts, PriceEntry, merge_records};
pub use listing::{CurrentListing, parse_time_left};
pub use price::{PriceError, median, normalize_price};
pub use recommendation::{EvaluationStrictness, Recommendation, SkipReason, Verdict};

/// Key used to match listings against history: trimmed and lowercased
pub fn normalize_item_name(name: &str) -> String {
    name.trim().to_lowercase()
}
