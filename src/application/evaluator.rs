//! Median-based listing evaluator

use std::collections::HashMap;

use tracing::debug;

use crate::domain::aggregate::ItemAggregate;
use crate::domain::history::{ItemHistory, PriceEntry};
use crate::domain::listing::CurrentListing;
use crate::domain::normalize_item_name;
use crate::domain::recommendation::{EvaluationStrictness, Recommendation, SkipReason, Verdict};

/// Compares live listings against historical medians
#[derive(Debug, Clone)]
pub struct Evaluator {
    aggregates: HashMap<String, ItemAggregate>,
    strictness: EvaluationStrictness,
}

impl Evaluator {
    /// Build aggregates keyed by normalized item name. Store keys that differ
    /// only in case or surrounding whitespace are pooled.
    pub fn from_history(history: &ItemHistory, strictness: EvaluationStrictness) -> Self {
        let mut pooled: HashMap<String, (&str, Vec<PriceEntry>)> = HashMap::new();
        for (name, entries) in history {
            pooled
                .entry(normalize_item_name(name))
                .or_insert_with(|| (name.as_str(), Vec::new()))
                .1
                .extend(entries.iter().cloned());
        }

        let aggregates: HashMap<String, ItemAggregate> = pooled
            .into_iter()
            .filter_map(|(key, (display, entries))| {
                ItemAggregate::from_entries(display, &entries).map(|agg| (key, agg))
            })
            .collect();

        debug!("Evaluator built with {} item aggregates", aggregates.len());
        Self {
            aggregates,
            strictness,
        }
    }

    pub fn strictness(&self) -> EvaluationStrictness {
        self.strictness
    }

    pub fn item_count(&self) -> usize {
        self.aggregates.len()
    }

    pub fn aggregate_for(&self, item_name: &str) -> Option<&ItemAggregate> {
        self.aggregates.get(&normalize_item_name(item_name))
    }

    /// Buyout below the median wins over a bid below the median
    pub fn evaluate(&self, listing: &CurrentListing) -> Recommendation {
        let Some(aggregate) = self.aggregate_for(&listing.item_name) else {
            return Recommendation {
                listing: listing.clone(),
                verdict: Verdict::Skip,
                reference_median: None,
                reason: Some(SkipReason::NoHistory),
            };
        };

        let median = aggregate.median_price;
        let qualifies = |price: Option<_>| {
            price.is_some_and(|p| self.strictness.qualifies(p, median))
        };

        let (verdict, reason) = if qualifies(listing.buyout_price) {
            (Verdict::Buyout, None)
        } else if qualifies(listing.bid_price) {
            (Verdict::Bid, None)
        } else {
            (Verdict::Skip, Some(SkipReason::NotBelowMedian))
        };

        Recommendation {
            listing: listing.clone(),
            verdict,
            reference_median: Some(median),
            reason,
        }
    }

    pub fn evaluate_all(&self, listings: &[CurrentListing]) -> Vec<Recommendation> {
        listings.iter().map(|listing| self.evaluate(listing)).collect()
    }
}
