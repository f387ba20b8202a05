//! Live auctions table extraction

use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::config::SelectorConfig;
use super::{
    ContextualParser, Extraction, ParseContext, ParsingError, ParsingResult, compile_selectors,
    first_name_text, first_text, select_rows,
};
use crate::domain::listing::{CurrentListing, parse_time_left};
use crate::domain::price::normalize_optional_price;

/// Cell values the site renders in place of a missing price
const PRICE_PLACEHOLDERS: &[&str] = &["-", "\u{2013}", "\u{2014}"];

/// Extracts [`CurrentListing`]s from a rendered auctions page
pub struct ListingExtractor {
    row_selectors: Vec<Selector>,
    name_selectors: Vec<Selector>,
    bid_selectors: Vec<Selector>,
    buyout_selectors: Vec<Selector>,
    time_left_selectors: Vec<Selector>,
}

impl ListingExtractor {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    pub fn with_config(config: &SelectorConfig) -> ParsingResult<Self> {
        let selectors = &config.listings;
        Ok(Self {
            row_selectors: compile_selectors("listings.row", &selectors.row)?,
            name_selectors: compile_selectors("listings.item_name", &selectors.item_name)?,
            bid_selectors: compile_selectors("listings.bid_price", &selectors.bid_price)?,
            buyout_selectors: compile_selectors("listings.buyout_price", &selectors.buyout_price)?,
            time_left_selectors: compile_selectors("listings.time_left", &selectors.time_left)?,
        })
    }

    fn extract_row(&self, row: &ElementRef<'_>) -> ParsingResult<CurrentListing> {
        let item_name = first_name_text(row, &self.name_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("item_name"))?;

        let bid_price = optional_price(row, &self.bid_selectors, "bid_price")?;
        let buyout_price = optional_price(row, &self.buyout_selectors, "buyout_price")?;
        if bid_price.is_none() && buyout_price.is_none() {
            return Err(ParsingError::NoPrice);
        }

        let raw_time_left = first_text(row, &self.time_left_selectors).unwrap_or_default();

        Ok(CurrentListing {
            item_name,
            bid_price,
            buyout_price,
            time_left: parse_time_left(&raw_time_left),
            raw_time_left,
        })
    }
}

fn optional_price(
    row: &ElementRef<'_>,
    selectors: &[Selector],
    field: &'static str,
) -> ParsingResult<Option<Decimal>> {
    let Some(raw) = first_text(row, selectors) else {
        return Ok(None);
    };
    if PRICE_PLACEHOLDERS.contains(&raw.as_str()) {
        return Ok(None);
    }
    normalize_optional_price(&raw).map_err(|e| ParsingError::invalid_price(field, &raw, e))
}

impl ContextualParser for ListingExtractor {
    type Output = Extraction<CurrentListing>;
    type Context = ParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output {
        let rows = select_rows(html, &self.row_selectors);
        if rows.is_empty() {
            warn!("No auction rows found on listings page {}", context.page_number);
        }

        let mut extraction = Extraction::default();
        for (row_index, row) in rows.iter().enumerate() {
            match self.extract_row(row) {
                Ok(listing) => extraction.records.push(listing),
                Err(reason) => {
                    debug!(
                        "Dropping listing row {} on page {}: {}",
                        row_index, context.page_number, reason
                    );
                    extraction.drop_row(row_index, reason);
                }
            }
        }

        debug!(
            "Extracted {} listings from page {} ({} dropped)",
            extraction.records.len(),
            context.page_number,
            extraction.dropped.len()
        );
        extraction
    }
}
