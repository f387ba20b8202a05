//! HTML extraction for auction pages
//!
//! Extractors are pure: rendered HTML in, records out. Malformed rows are
//! reported as [`DroppedRow`]s and never fail the page.

pub mod config;
pub mod context;
pub mod error;
pub mod history_parser;
pub mod listing_parser;
pub mod navigation;

pub use config::{HistorySelectors, ListingSelectors, NavigationSelectors, SelectorConfig};
pub use context::{DroppedRow, Extraction, ParseContext};
pub use error::{ParsingError, ParsingResult};
pub use history_parser::HistoryExtractor;
pub use listing_parser::ListingExtractor;
pub use navigation::{NextLink, PageIndicator, PageNavigator};

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Parser over an already-parsed document with per-page context
pub trait ContextualParser {
    type Output;
    type Context;

    fn parse_with_context(&self, html: &Html, context: &Self::Context) -> Self::Output;

    /// Parse raw HTML text
    fn parse_str(&self, html: &str, context: &Self::Context) -> Self::Output {
        let document = Html::parse_document(html);
        self.parse_with_context(&document, context)
    }
}

/// Compile a fallback list of selectors, skipping (and logging) invalid ones.
///
/// Fails only when none of the selectors compile.
pub(crate) fn compile_selectors(field: &str, selector_strings: &[String]) -> ParsingResult<Vec<Selector>> {
    let mut selectors = Vec::new();
    let mut errors = Vec::new();

    for selector_str in selector_strings {
        match Selector::parse(selector_str) {
            Ok(selector) => selectors.push(selector),
            Err(e) => {
                warn!("Failed to compile selector '{}' for {}: {}", selector_str, field, e);
                errors.push(ParsingError::invalid_selector(selector_str, e).to_string());
            }
        }
    }

    if selectors.is_empty() {
        return Err(ParsingError::NoValidSelectors {
            field: field.to_string(),
            errors: errors.join(", "),
        });
    }

    if !errors.is_empty() {
        debug!("Some selectors for {} failed to compile: {}", field, errors.join(", "));
    }

    Ok(selectors)
}

/// Rows from the first selector that yields any
pub(crate) fn select_rows<'a>(html: &'a Html, selectors: &[Selector]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .map(|selector| html.select(selector).collect::<Vec<_>>())
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}

/// Trimmed, whitespace-collapsed text of an element
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first non-empty match within `element`
pub(crate) fn first_text(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        element
            .select(selector)
            .map(|el| element_text(&el))
            .find(|text| !text.is_empty())
    })
}

/// Item name text of the first matching element, ignoring `<small>` quality tags
pub(crate) fn first_name_text(element: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        element
            .select(selector)
            .filter(|el| !inside_small(el))
            .map(|el| own_text(&el))
            .find(|text| !text.is_empty())
    })
}

pub(crate) fn inside_small(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(|node| node.value().as_element())
        .any(|el| el.name() == "small")
}

/// Text of an element excluding any nested `<small>` content
pub(crate) fn own_text(element: &ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        if let Some(text) = node.value().as_text() {
            let in_small = node
                .ancestors()
                .take_while(|ancestor| ancestor.id() != element.id())
                .filter_map(|ancestor| ancestor.value().as_element())
                .any(|el| el.name() == "small");
            if !in_small {
                parts.push(&**text);
            }
        }
    }
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}
