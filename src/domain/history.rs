//! Historical sale records and the per-item history mapping

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// One completed sale as scraped from a history page.
///
/// Identity is the full `(item_name, timestamp, price)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryRecord {
    pub item_name: String,
    pub price: Decimal,
    pub timestamp: NaiveDateTime,
}

impl HistoryRecord {
    pub fn new(item_name: impl Into<String>, price: Decimal, timestamp: NaiveDateTime) -> Self {
        Self {
            item_name: item_name.into(),
            price,
            timestamp,
        }
    }

    /// Stored form of this record under its item name
    pub fn to_entry(&self) -> PriceEntry {
        PriceEntry {
            price: self.price,
            timestamp: Some(self.timestamp),
        }
    }
}

/// A stored sale under an item name in the JSON store.
///
/// `timestamp` is optional because older store files may lack it or carry
/// a non-ISO string; such values load as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,

    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<NaiveDateTime>,
}

impl PriceEntry {
    /// Exact-tuple match against a freshly scraped record
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        self.price == record.price && self.timestamp == Some(record.timestamp)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match s.parse::<NaiveDateTime>() {
        Ok(ts) => Some(ts),
        Err(e) => {
            debug!("Ignoring non-ISO timestamp '{}': {}", s, e);
            None
        }
    }))
}

/// Item name -> ordered sales. Append-only outside of a full merge.
pub type ItemHistory = BTreeMap<String, Vec<PriceEntry>>;

/// Result of folding a batch into an [`ItemHistory`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeCounts {
    pub appended: usize,
    pub duplicates: usize,
}

/// Append every record not already present (exact tuple match).
///
/// Duplicates inside `records` itself are also collapsed, so merging the
/// same batch twice leaves the history unchanged the second time.
pub fn merge_records(history: &mut ItemHistory, records: &[HistoryRecord]) -> MergeCounts {
    let mut counts = MergeCounts::default();

    for record in records {
        let entries = history.entry(record.item_name.clone()).or_default();
        if entries.iter().any(|entry| entry.matches(record)) {
            counts.duplicates += 1;
            continue;
        }
        entries.push(record.to_entry());
        counts.appended += 1;
    }

    counts
}

/// Total number of stored sales across all items
pub fn total_entries(history: &ItemHistory) -> usize {
    history.values().map(Vec::len).sum()
}
