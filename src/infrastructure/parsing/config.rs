//! Selector configuration for page extraction
//!
//! Every field is an ordered list of CSS selectors; the first one that
//! matches wins, so a site layout change can be absorbed by appending a
//! fallback in the config file instead of a code change.

use serde::{Deserialize, Serialize};

/// Main selector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub history: HistorySelectors,
    pub listings: ListingSelectors,
    pub navigation: NavigationSelectors,

    /// `chrono` formats for "date time" cell text, tried in order
    pub timestamp_formats: Vec<String>,

    /// Date-only fallbacks, interpreted at midnight
    pub date_formats: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            history: HistorySelectors::default(),
            listings: ListingSelectors::default(),
            navigation: NavigationSelectors::default(),
            timestamp_formats: vec!["%m/%d/%Y %I:%M:%S %p".to_string()],
            date_formats: vec!["%m/%d/%Y".to_string()],
        }
    }
}

/// CSS selectors for the sales history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySelectors {
    pub row: Vec<String>,
    pub item_name: Vec<String>,
    pub price: Vec<String>,
    pub date: Vec<String>,
    pub time: Vec<String>,
}

impl Default for HistorySelectors {
    fn default() -> Self {
        Self {
            row: vec![
                "main > div:nth-of-type(2) table tbody tr".to_string(),
                "table tbody tr".to_string(),
            ],
            item_name: vec!["td:nth-child(1) span".to_string()],
            price: vec![
                "td:nth-child(2) div.justify-end".to_string(),
                "td:nth-child(2)".to_string(),
            ],
            date: vec!["td:nth-child(3) div.justify-end".to_string()],
            time: vec!["td:nth-child(3) small".to_string()],
        }
    }
}

/// CSS selectors for the live auctions table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub row: Vec<String>,
    pub item_name: Vec<String>,
    pub bid_price: Vec<String>,
    pub buyout_price: Vec<String>,
    pub time_left: Vec<String>,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            row: vec![
                "main > div:nth-of-type(2) table tbody tr".to_string(),
                "table tbody tr".to_string(),
            ],
            item_name: vec!["td:nth-child(1) span".to_string(), "td:nth-child(1)".to_string()],
            bid_price: vec!["td:nth-child(2)".to_string()],
            buyout_price: vec!["td:nth-child(3)".to_string()],
            time_left: vec!["td:nth-child(4)".to_string()],
        }
    }
}

/// Pagination controls shared by both tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSelectors {
    pub next_button: Vec<String>,
    /// Elements whose text carries "Page X of Y"
    pub page_indicator: Vec<String>,
    /// Button/link label used when no `next_button` selector matches
    pub next_label: String,
}

impl Default for NavigationSelectors {
    fn default() -> Self {
        Self {
            next_button: vec![
                "button[aria-label='Next page']".to_string(),
                "a[aria-label='Next page']".to_string(),
                "a[rel='next']".to_string(),
            ],
            page_indicator: vec!["main div > p".to_string(), "p".to_string()],
            next_label: "Next".to_string(),
        }
    }
}
