//! Pagination control detection: the "Next" control and the "Page X of Y" indicator

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::config::SelectorConfig;
use super::{ParsingResult, compile_selectors, element_text};
use crate::infrastructure::page_source::NextControl;

static PAGE_INDICATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Page\s+(\d+)\s+of\s+(\d+)").expect("valid page indicator regex"));

static CANDIDATE_CONTROLS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("button, a").expect("valid control selector"));

/// Parsed "Page X of Y"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageIndicator {
    pub current: u32,
    pub total: u32,
}

impl PageIndicator {
    pub fn is_last(&self) -> bool {
        self.current >= self.total
    }
}

/// State of the next control plus its link target, if it is an anchor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextLink {
    pub control: NextControl,
    pub href: Option<String>,
}

/// Reads pagination state out of a rendered page
pub struct PageNavigator {
    next_selectors: Vec<Selector>,
    indicator_selectors: Vec<Selector>,
    next_label: String,
}

impl PageNavigator {
    pub fn new() -> ParsingResult<Self> {
        Self::with_config(&SelectorConfig::default())
    }

    pub fn with_config(config: &SelectorConfig) -> ParsingResult<Self> {
        let nav = &config.navigation;
        Ok(Self {
            next_selectors: compile_selectors("navigation.next_button", &nav.next_button)?,
            indicator_selectors: compile_selectors("navigation.page_indicator", &nav.page_indicator)?,
            next_label: nav.next_label.to_lowercase(),
        })
    }

    /// Locate the next control. A labelled `button`/`a` is used when no
    /// configured selector matches.
    pub fn next_link(&self, html: &Html) -> NextLink {
        let element = self
            .next_selectors
            .iter()
            .find_map(|selector| html.select(selector).next())
            .or_else(|| {
                html.select(&CANDIDATE_CONTROLS)
                    .find(|el| element_text(el).to_lowercase() == self.next_label)
            });

        match element {
            None => NextLink {
                control: NextControl::Absent,
                href: None,
            },
            Some(el) => NextLink {
                control: if is_disabled(&el) {
                    NextControl::Disabled
                } else {
                    NextControl::Enabled
                },
                href: el.value().attr("href").map(str::to_string),
            },
        }
    }

    pub fn page_indicator(&self, html: &Html) -> Option<PageIndicator> {
        self.indicator_selectors.iter().find_map(|selector| {
            html.select(selector)
                .find_map(|el| parse_page_indicator(&element_text(&el)))
        })
    }
}

fn is_disabled(element: &ElementRef<'_>) -> bool {
    let value = element.value();
    value.attr("disabled").is_some()
        || value.attr("aria-disabled") == Some("true")
        || value.classes().any(|class| class == "disabled")
}

/// Parse "Page X of Y" from arbitrary text
pub fn parse_page_indicator(text: &str) -> Option<PageIndicator> {
    let captures = PAGE_INDICATOR_RE.captures(text)?;
    Some(PageIndicator {
        current: captures[1].parse().ok()?,
        total: captures[2].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body><main><div>{body}</div></main></body></html>"))
    }

    #[test]
    fn detects_enabled_disabled_and_absent() {
        let nav = PageNavigator::new().unwrap();

        let enabled = nav.next_link(&doc(r#"<a rel="next" href="/?page=2">Next</a>"#));
        assert_eq!(enabled.control, NextControl::Enabled);
        assert_eq!(enabled.href.as_deref(), Some("/?page=2"));

        let disabled = nav.next_link(&doc("<button disabled>Next</button>"));
        assert_eq!(disabled.control, NextControl::Disabled);

        let aria = nav.next_link(&doc(r#"<button aria-label="Next page" aria-disabled="true">›</button>"#));
        assert_eq!(aria.control, NextControl::Disabled);

        let absent = nav.next_link(&doc("<button>Previous</button>"));
        assert_eq!(absent.control, NextControl::Absent);
    }

    #[test]
    fn reads_page_indicator() {
        let nav = PageNavigator::new().unwrap();
        let indicator = nav.page_indicator(&doc("<p>Page 3 of 12</p>")).unwrap();
        assert_eq!(indicator, PageIndicator { current: 3, total: 12 });
        assert!(!indicator.is_last());

        assert!(parse_page_indicator("Page 12 of 12").unwrap().is_last());
        assert!(parse_page_indicator("no pages here").is_none());
    }
}
