//! Price normalization and median computation
//!
//! Auction prices arrive as display strings ("4,500", "1 200 ", "$350").
//! They are normalized to `Decimal` before any comparison so that history
//! and live listings share one numeric representation.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Characters stripped as thousands separators
const THOUSANDS_SEPARATORS: &[char] = &[',', '_', '\''];

/// Currency markers the site (or a copy-pasted export) may carry
const CURRENCY_MARKERS: &[&str] = &["crowns", "crown", "cr", "$", "€", "£", "¥", "₩"];

/// Why a price string could not be converted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("price text is empty")]
    Empty,

    #[error("price text '{raw}' is not numeric")]
    NotNumeric { raw: String },

    #[error("price {value} is negative")]
    Negative { value: Decimal },
}

/// Normalize a raw price string into a `Decimal`.
///
/// Whitespace (including non-breaking spaces), thousands separators and
/// currency markers are removed before parsing. Anything else left over
/// makes the price unparseable.
pub fn normalize_price(raw: &str) -> Result<Decimal, PriceError> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !THOUSANDS_SEPARATORS.contains(c))
        .collect::<String>()
        .to_lowercase();

    for marker in CURRENCY_MARKERS {
        if let Some(stripped) = cleaned.strip_suffix(marker) {
            cleaned = stripped.to_string();
        }
        if let Some(stripped) = cleaned.strip_prefix(marker) {
            cleaned = stripped.to_string();
        }
    }

    if cleaned.is_empty() {
        return Err(PriceError::Empty);
    }

    let value = Decimal::from_str(&cleaned).map_err(|_| PriceError::NotNumeric {
        raw: raw.trim().to_string(),
    })?;

    if value.is_sign_negative() && !value.is_zero() {
        return Err(PriceError::Negative { value });
    }

    Ok(value.normalize())
}

/// Like [`normalize_price`], but a blank cell means "no price" rather than an error.
pub fn normalize_optional_price(raw: &str) -> Result<Option<Decimal>, PriceError> {
    match normalize_price(raw) {
        Ok(value) => Ok(Some(value)),
        Err(PriceError::Empty) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Standard median. Even-length series average the two middle values.
///
/// Returns `None` for an empty series.
pub fn median(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }

    let mut sorted = prices.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / Decimal::from(2))
    } else {
        Some(sorted[mid])
    }
}
