//! Evaluator verdicts

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::listing::CurrentListing;

/// The evaluator's recommendation for a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Bid,
    Buyout,
    Skip,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Bid => "BID",
            Self::Buyout => "BUYOUT",
            Self::Skip => "SKIP",
        };
        f.write_str(label)
    }
}

/// Why a listing was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    #[serde(rename = "no history")]
    NoHistory,
    #[serde(rename = "not below median")]
    NotBelowMedian,
}

impl SkipReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::NoHistory => "no history",
            Self::NotBelowMedian => "not below median",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How a price equal to the median is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStrictness {
    /// Price must be strictly below the median
    #[default]
    Strict,
    /// Price at or below the median qualifies
    Inclusive,
}

impl EvaluationStrictness {
    pub fn qualifies(self, price: Decimal, median: Decimal) -> bool {
        match self {
            Self::Strict => price < median,
            Self::Inclusive => price <= median,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub listing: CurrentListing,
    pub verdict: Verdict,
    /// Absent only when the item has no history
    pub reference_median: Option<Decimal>,
    pub reason: Option<SkipReason>,
}

/// CSV row for the recommendations export
#[derive(Debug, Serialize)]
pub struct RecommendationRow<'a> {
    pub item_name: &'a str,
    pub bid_price: Option<Decimal>,
    pub buyout_price: Option<Decimal>,
    pub time_left_minutes: u64,
    pub raw_time_left: &'a str,
    pub historical_median: Option<Decimal>,
    pub verdict: Verdict,
    pub reason: Option<SkipReason>,
}

impl<'a> From<&'a Recommendation> for RecommendationRow<'a> {
    fn from(rec: &'a Recommendation) -> Self {
        Self {
            item_name: &rec.listing.item_name,
            bid_price: rec.listing.bid_price,
            buyout_price: rec.listing.buyout_price,
            time_left_minutes: rec.listing.time_left_minutes(),
            raw_time_left: rec.listing.raw_time_left.trim(),
            historical_median: rec.reference_median,
            verdict: rec.verdict,
            reason: rec.reason,
        }
    }
}
