//! Live auction listings and "time left" parsing

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

static HOURS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*h").expect("valid hours regex"));
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*m").expect("valid minutes regex"));

/// One listing scraped from the current auctions table.
///
/// Transient: fetched fresh on every evaluator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentListing {
    pub item_name: String,
    pub bid_price: Option<Decimal>,
    pub buyout_price: Option<Decimal>,
    pub time_left: Duration,
    /// Cell text as displayed, kept for exports
    pub raw_time_left: String,
}

impl CurrentListing {
    pub fn time_left_minutes(&self) -> u64 {
        self.time_left.as_secs() / 60
    }
}

/// CSV row for the full listing export
#[derive(Debug, Serialize)]
pub struct ListingRow<'a> {
    pub item_name: &'a str,
    pub bid_price: Option<Decimal>,
    pub buyout_price: Option<Decimal>,
    pub time_left_minutes: u64,
    pub raw_time_left: &'a str,
}

impl<'a> From<&'a CurrentListing> for ListingRow<'a> {
    fn from(listing: &'a CurrentListing) -> Self {
        Self {
            item_name: &listing.item_name,
            bid_price: listing.bid_price,
            buyout_price: listing.buyout_price,
            time_left_minutes: listing.time_left_minutes(),
            raw_time_left: listing.raw_time_left.trim(),
        }
    }
}

/// Parse the "Time Left" cell into a duration.
///
/// `-` and `Very Short` mean the auction is about to close (zero).
/// Accepts `5m`, `1h`, `1h30m`; a bare number is minutes. Anything else
/// logs a warning and yields zero.
pub fn parse_time_left(text: &str) -> Duration {
    let raw = text.trim().to_lowercase();
    if raw.is_empty() || raw == "-" || raw == "very short" {
        return Duration::ZERO;
    }

    let hours = HOURS_RE
        .captures(&raw)
        .and_then(|c| c[1].parse::<u64>().ok());
    let minutes = MINUTES_RE
        .captures(&raw)
        .and_then(|c| c[1].parse::<u64>().ok());

    let total_minutes = match (hours, minutes) {
        (None, None) => match raw.parse::<u64>() {
            Ok(m) => m,
            Err(_) => {
                warn!("Could not parse time left: '{}'", text);
                0
            }
        },
        (h, m) => {
            let total = h
                .unwrap_or(0)
                .checked_mul(60)
                .and_then(|hour_minutes| hour_minutes.checked_add(m.unwrap_or(0)));
            match total {
                Some(total) => total,
                None => {
                    warn!("Time left out of range: '{}'", text);
                    return Duration::ZERO;
                }
            }
        }
    };

    debug!("Parsed time left: '{}' -> {} minutes", text, total_minutes);
    match total_minutes.checked_mul(60) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!("Time left out of range: '{}'", text);
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("-", 0)]
    #[case("Very Short", 0)]
    #[case("5m", 5)]
    #[case("30 m", 30)]
    #[case("1h", 60)]
    #[case("1h30m", 90)]
    #[case("2h 5m", 125)]
    #[case("45", 45)]
    #[case("soon", 0)]
    #[case("999999999999999999h", 0)]
    #[case("999999999999999999999999h", 0)]
    #[case("999999999999999999", 0)]
    fn parses_time_left(#[case] text: &str, #[case] minutes: u64) {
        assert_eq!(parse_time_left(text), Duration::from_secs(minutes * 60));
    }
}
