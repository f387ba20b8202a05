//! Parsing error types for page extraction
//!
//! Row-level variants are recoverable: the offending row is dropped and the
//! rest of the page is still extracted. Selector variants are configuration
//! problems and abort extractor construction.

use thiserror::Error;

use crate::domain::price::PriceError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    #[error("Required field '{field}' not found in row")]
    RequiredFieldMissing { field: &'static str },

    #[error("Unparseable {field} '{raw}': {source}")]
    InvalidPrice {
        field: &'static str,
        raw: String,
        #[source]
        source: PriceError,
    },

    #[error("Listing has neither a bid nor a buyout price")]
    NoPrice,

    #[error("Unparseable timestamp '{raw}'")]
    InvalidTimestamp { raw: String, tried_formats: Vec<String> },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("No valid selectors for '{field}': {errors}")]
    NoValidSelectors { field: String, errors: String },
}

impl ParsingError {
    pub fn required_field_missing(field: &'static str) -> Self {
        Self::RequiredFieldMissing { field }
    }

    pub fn invalid_price(field: &'static str, raw: &str, source: PriceError) -> Self {
        Self::InvalidPrice {
            field,
            raw: raw.trim().to_string(),
            source,
        }
    }

    pub fn invalid_timestamp(raw: &str, tried_formats: &[String]) -> Self {
        Self::InvalidTimestamp {
            raw: raw.trim().to_string(),
            tried_formats: tried_formats.to_vec(),
        }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if extraction can continue past this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RequiredFieldMissing { .. }
            | Self::InvalidPrice { .. }
            | Self::NoPrice
            | Self::InvalidTimestamp { .. } => true,
            Self::InvalidSelector { .. } | Self::NoValidSelectors { .. } => false,
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;
