//! Sales history table extraction

use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::config::SelectorConfig;
use super::{
    ContextualParser, Extraction, ParseContext, ParsingError, ParsingResult, compile_selectors,
    first_name_text, first_text, select_rows,
};
use crate::domain::history::HistoryRecord;
use crate::domain::price::normalize_price;

/// Extracts [`HistoryRecord`]s from a rendered history page
pub struct HistoryExtractor {
    row_selectors: Vec<Selector>,
    name_selectors: Vec<Selector>,
    price_selectors: Vec<Selector>,
    date_selectors: Vec<Selector>,
    time_selectors: Vec<Selector>,
    timestamp_formats: Vec<String>,
    date_formats: Vec<String>,
}

impl HistoryExtractor {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    pub fn with_config(config: &SelectorConfig) -> ParsingResult<Self> {
        let selectors = &config.history;
        Ok(Self {
            row_selectors: compile_selectors("history.row", &selectors.row)?,
            name_selectors: compile_selectors("history.item_name", &selectors.item_name)?,
            price_selectors: compile_selectors("history.price", &selectors.price)?,
            date_selectors: compile_selectors("history.date", &selectors.date)?,
            time_selectors: compile_selectors("history.time", &selectors.time)?,
            timestamp_formats: config.timestamp_formats.clone(),
            date_formats: config.date_formats.clone(),
        })
    }

    fn extract_row(&self, row: &ElementRef<'_>) -> ParsingResult<HistoryRecord> {
        let item_name = self
            .item_name(row)
            .ok_or_else(|| ParsingError::required_field_missing("item_name"))?;

        let raw_price = first_text(row, &self.price_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("price"))?;
        let price = normalize_price(&raw_price)
            .map_err(|e| ParsingError::invalid_price("price", &raw_price, e))?;

        let date_text = first_text(row, &self.date_selectors)
            .ok_or_else(|| ParsingError::required_field_missing("date"))?;
        let time_text = first_text(row, &self.time_selectors).unwrap_or_default();
        let timestamp = self.parse_timestamp(&date_text, &time_text)?;

        Ok(HistoryRecord::new(item_name, price, timestamp))
    }

    /// First matching `span` that is not nested in a `<small>` (quality tags live there)
    fn item_name(&self, row: &ElementRef<'_>) -> Option<String> {
        first_name_text(row, &self.name_selectors)
    }

    /// The date cell's own text may also carry the time; the `<small>` text is
    /// removed from it before combining.
    fn parse_timestamp(&self, date_text: &str, time_text: &str) -> ParsingResult<NaiveDateTime> {
        let date_only = date_text.replace(time_text, "");
        let date_only = date_only.trim();
        let combined = format!("{date_only} {time_text}");
        let combined = combined.trim();

        for format in &self.timestamp_formats {
            if let Ok(ts) = NaiveDateTime::parse_from_str(combined, format) {
                return Ok(ts);
            }
        }

        for format in &self.date_formats {
            if let Ok(date) = NaiveDate::parse_from_str(date_only, format) {
                debug!("Timestamp '{}' parsed as date only", combined);
                return Ok(date.and_time(chrono::NaiveTime::MIN));
            }
        }

        let mut tried = self.timestamp_formats.clone();
        tried.extend(self.date_formats.iter().cloned());
        Err(ParsingError::invalid_timestamp(combined, &tried))
    }
}

impl ContextualParser for HistoryExtractor {
    type Output = Extraction<HistoryRecord>;
    type Context = ParseContext;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output {
        let rows = select_rows(html, &self.row_selectors);
        if rows.is_empty() {
            warn!("No history rows found on page {} ({})", context.page_number, context.url);
        }

        let mut extraction = Extraction::default();
        for (row_index, row) in rows.iter().enumerate() {
            match self.extract_row(row) {
                Ok(record) => extraction.records.push(record),
                Err(reason) => {
                    debug!(
                        "Dropping history row {} on page {}: {}",
                        row_index, context.page_number, reason
                    );
                    extraction.drop_row(row_index, reason);
                }
            }
        }

        debug!(
            "Extracted {} records from history page {} ({} dropped)",
            extraction.records.len(),
            context.page_number,
            extraction.dropped.len()
        );
        extraction
    }
}
