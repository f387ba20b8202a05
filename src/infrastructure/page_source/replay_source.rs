//! Page source replaying saved HTML
//!
//! Serves history pages by number and listing pages in order, from memory or
//! from a directory of `history_{N}.html` / `listings_{N}.html` files. Faults
//! can be scripted per page so retry and skip paths are reproducible.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info};

use super::{NavigationError, NextControl, PageSource, PageSourceFactory, RenderedPage};
use crate::infrastructure::parsing::PageNavigator;

static REPLAY_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(history|listings)_(\d+)\.html$").expect("valid replay file regex"));

/// The saved pages a replay source serves
#[derive(Debug, Clone, Default)]
pub struct ReplayPages {
    history: BTreeMap<u32, String>,
    listings: BTreeMap<u32, String>,
}

impl ReplayPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_page(mut self, page_number: u32, html: impl Into<String>) -> Self {
        self.history.insert(page_number, html.into());
        self
    }

    pub fn with_listings_page(mut self, page_number: u32, html: impl Into<String>) -> Self {
        self.listings.insert(page_number, html.into());
        self
    }

    /// Load every `history_{N}.html` and `listings_{N}.html` in `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut pages = Self::default();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read replay directory {:?}", dir))?;

        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(captures) = REPLAY_FILE_RE.captures(name) else {
                continue;
            };
            let page_number: u32 = captures[2]
                .parse()
                .with_context(|| format!("Invalid page number in {name}"))?;
            let html = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read replay page {:?}", path))?;

            match &captures[1] {
                "history" => pages.history.insert(page_number, html),
                _ => pages.listings.insert(page_number, html),
            };
        }

        info!(
            "📂 Loaded {} history and {} listing pages from {:?}",
            pages.history.len(),
            pages.listings.len(),
            dir
        );
        Ok(pages)
    }

    pub fn history_page_count(&self) -> usize {
        self.history.len()
    }
}

/// Scripted failures, consumed front to back
#[derive(Debug, Clone, Default)]
struct Faults {
    history: HashMap<u32, VecDeque<NavigationError>>,
    next_control: VecDeque<NavigationError>,
    click: VecDeque<NavigationError>,
    /// Clicks that "succeed" but leave the listings on the same page
    stalled_clicks: u32,
}

pub struct ReplayPageSource {
    pages: Arc<ReplayPages>,
    navigator: Arc<PageNavigator>,
    faults: Faults,
    listing_page: Option<u32>,
    requests: Arc<Mutex<Vec<u32>>>,
}

impl ReplayPageSource {
    pub fn new(pages: Arc<ReplayPages>, navigator: Arc<PageNavigator>) -> Self {
        Self {
            pages,
            navigator,
            faults: Faults::default(),
            listing_page: None,
            requests: Arc::default(),
        }
    }

    /// Fail the next `times` requests for a history page with `error`
    pub fn fail_history_page(mut self, page_number: u32, error: NavigationError, times: usize) -> Self {
        self.faults
            .history
            .entry(page_number)
            .or_default()
            .extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn fail_next_control(mut self, error: NavigationError, times: usize) -> Self {
        self.faults.next_control.extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn fail_clicks(mut self, error: NavigationError, times: usize) -> Self {
        self.faults.click.extend(std::iter::repeat_n(error, times));
        self
    }

    pub fn stall_clicks(mut self, times: u32) -> Self {
        self.faults.stalled_clicks = times;
        self
    }

    /// Share a log of every history page number requested
    pub fn with_request_log(mut self, log: Arc<Mutex<Vec<u32>>>) -> Self {
        self.requests = log;
        self
    }

    fn listing(&self, page_number: u32) -> Result<RenderedPage, NavigationError> {
        self.pages
            .listings
            .get(&page_number)
            .map(|html| RenderedPage::new(format!("replay://listings/{page_number}"), html.clone()))
            .ok_or(NavigationError::PageNotFound { page_number })
    }

    fn current_listing(&self) -> Result<(u32, &str), NavigationError> {
        let page_number = self.listing_page.ok_or_else(|| NavigationError::InvalidTarget {
            target: "listings have not been opened".to_string(),
        })?;
        let html = self
            .pages
            .listings
            .get(&page_number)
            .ok_or(NavigationError::PageNotFound { page_number })?;
        Ok((page_number, html))
    }
}

#[async_trait]
impl PageSource for ReplayPageSource {
    async fn open_history_page(&mut self, page_number: u32) -> Result<RenderedPage, NavigationError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(page_number);
        }

        if let Some(error) = self
            .faults
            .history
            .get_mut(&page_number)
            .and_then(VecDeque::pop_front)
        {
            debug!("Replaying scripted failure for history page {}: {}", page_number, error);
            return Err(error);
        }

        self.pages
            .history
            .get(&page_number)
            .map(|html| RenderedPage::new(format!("replay://history/{page_number}"), html.clone()))
            .ok_or(NavigationError::PageNotFound { page_number })
    }

    async fn open_listings(&mut self) -> Result<RenderedPage, NavigationError> {
        let first = self
            .pages
            .listings
            .keys()
            .next()
            .copied()
            .ok_or(NavigationError::PageNotFound { page_number: 1 })?;
        let page = self.listing(first)?;
        self.listing_page = Some(first);
        Ok(page)
    }

    async fn next_control(&mut self) -> Result<NextControl, NavigationError> {
        if let Some(error) = self.faults.next_control.pop_front() {
            return Err(error);
        }
        let (_, html) = self.current_listing()?;
        let document = Html::parse_document(html);
        Ok(self.navigator.next_link(&document).control)
    }

    async fn click_next(&mut self) -> Result<RenderedPage, NavigationError> {
        if let Some(error) = self.faults.click.pop_front() {
            return Err(error);
        }
        let (current, _) = self.current_listing()?;
        if self.faults.stalled_clicks > 0 {
            self.faults.stalled_clicks -= 1;
            debug!("Replaying stalled click on listings page {}", current);
            return self.listing(current);
        }

        let next = self
            .pages
            .listings
            .range(current + 1..)
            .next()
            .map(|(n, _)| *n)
            .ok_or(NavigationError::PageNotFound { page_number: current + 1 })?;
        let page = self.listing(next)?;
        self.listing_page = Some(next);
        Ok(page)
    }
}

/// Hands every worker a fresh source over the same pages
pub struct ReplayPageSourceFactory {
    pages: Arc<ReplayPages>,
    navigator: Arc<PageNavigator>,
    requests: Arc<Mutex<Vec<u32>>>,
    #[allow(clippy::type_complexity)]
    customize: Option<Box<dyn Fn(usize, ReplayPageSource) -> ReplayPageSource + Send + Sync>>,
}

impl ReplayPageSourceFactory {
    pub fn new(pages: ReplayPages, navigator: Arc<PageNavigator>) -> Self {
        Self {
            pages: Arc::new(pages),
            navigator,
            requests: Arc::default(),
            customize: None,
        }
    }

    /// Adjust each created source, e.g. to script faults for one worker
    pub fn with_customizer<F>(mut self, customize: F) -> Self
    where
        F: Fn(usize, ReplayPageSource) -> ReplayPageSource + Send + Sync + 'static,
    {
        self.customize = Some(Box::new(customize));
        self
    }

    /// History page numbers requested by all sources, in request order
    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl PageSourceFactory for ReplayPageSourceFactory {
    fn create(&self, worker_id: usize) -> Result<Box<dyn PageSource>> {
        let source = ReplayPageSource::new(Arc::clone(&self.pages), Arc::clone(&self.navigator))
            .with_request_log(Arc::clone(&self.requests));
        let source = match &self.customize {
            Some(customize) => customize(worker_id, source),
            None => source,
        };
        Ok(Box::new(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_pages_and_scripted_faults() {
        let pages = Arc::new(ReplayPages::new().with_history_page(1, "<p>one</p>"));
        let navigator = Arc::new(PageNavigator::new().unwrap());
        let mut source = ReplayPageSource::new(pages, navigator)
            .fail_history_page(1, NavigationError::timeout("history 1"), 1);

        assert!(matches!(
            source.open_history_page(1).await,
            Err(NavigationError::Timeout { .. })
        ));
        assert_eq!(source.open_history_page(1).await.unwrap().html, "<p>one</p>");
        assert_eq!(
            source.open_history_page(2).await,
            Err(NavigationError::PageNotFound { page_number: 2 })
        );
    }

    #[test]
    fn loads_pages_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("history_3.html"), "<p>three</p>").unwrap();
        std::fs::write(dir.path().join("listings_1.html"), "<p>l1</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let pages = ReplayPages::from_dir(dir.path()).unwrap();
        assert_eq!(pages.history_page_count(), 1);
        assert_eq!(pages.listings.len(), 1);
    }
}
