//! Paginators over a [`PageSource`]
//!
//! [`HistoryPaginator`] addresses pages directly and walks a fixed range.
//! [`ListingPaginator`] can only move forward through the "Next" control and
//! is driven by an explicit [`NavState`] machine.

use std::time::Duration;

use scraper::Html;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::page_source::{
    FetchOutcome, NavigationError, NextControl, PageSource, RenderedPage,
};
use crate::infrastructure::parsing::{PageIndicator, PageNavigator};
use crate::infrastructure::retry_manager::{RetryDecision, RetryPolicy};

/// One step of a history crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    Fetched {
        page_number: u32,
        page: RenderedPage,
        attempts: u32,
    },
    /// Retries exhausted or a permanent error; the crawl moves on
    Skipped {
        page_number: u32,
        error: NavigationError,
        attempts: u32,
    },
}

impl PageResult {
    pub fn page_number(&self) -> u32 {
        match self {
            Self::Fetched { page_number, .. } | Self::Skipped { page_number, .. } => *page_number,
        }
    }
}

/// Why a history paginator stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEnd {
    /// Every page in the range was yielded
    Completed,
    /// The source reported that a page does not exist
    EndOfList { page_number: u32 },
    Cancelled,
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn wait_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        () = cancel.cancelled() => false,
    }
}

/// Lazy, page-ordered walk over `[first_page, last_page]`
pub struct HistoryPaginator<'a, S: PageSource + ?Sized> {
    source: &'a mut S,
    next_page: u32,
    last_page: u32,
    retry: RetryPolicy,
    cancel: CancellationToken,
    end: Option<HistoryEnd>,
}

impl<'a, S: PageSource + ?Sized> HistoryPaginator<'a, S> {
    pub fn new(
        source: &'a mut S,
        first_page: u32,
        last_page: u32,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            next_page: first_page,
            last_page,
            retry,
            cancel,
            end: None,
        }
    }

    /// Set once the paginator has returned `None`
    pub fn end(&self) -> Option<HistoryEnd> {
        self.end
    }

    /// Step past the current page; the walk ends at the top of the page space
    fn step_past_page(&mut self) {
        match self.next_page.checked_add(1) {
            Some(next) => self.next_page = next,
            None => self.end = Some(HistoryEnd::Completed),
        }
    }

    pub async fn next(&mut self) -> Option<PageResult> {
        if self.end.is_some() {
            return None;
        }
        if self.next_page > self.last_page {
            self.end = Some(HistoryEnd::Completed);
            return None;
        }
        if self.cancel.is_cancelled() {
            info!("🛑 Cancellation requested before history page {}", self.next_page);
            self.end = Some(HistoryEnd::Cancelled);
            return None;
        }

        let page_number = self.next_page;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = FetchOutcome::from(self.source.open_history_page(page_number).await);

            let error = match outcome {
                FetchOutcome::Page(page) => {
                    self.step_past_page();
                    return Some(PageResult::Fetched {
                        page_number,
                        page,
                        attempts: attempt,
                    });
                }
                FetchOutcome::EndOfList => {
                    info!("History ends before page {}", page_number);
                    self.end = Some(HistoryEnd::EndOfList { page_number });
                    return None;
                }
                FetchOutcome::Failed(error) => {
                    warn!("❌ Skipping history page {}: {}", page_number, error);
                    self.step_past_page();
                    return Some(PageResult::Skipped {
                        page_number,
                        error,
                        attempts: attempt,
                    });
                }
                FetchOutcome::TransientFailure(error) => error,
            };

            match self.retry.decide(attempt, &error) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "🔄 History page {} attempt {}/{} failed: {}; retrying in {:?}",
                        page_number, attempt, self.retry.max_attempts, error, delay
                    );
                    if !wait_or_cancel(&self.cancel, delay).await {
                        self.end = Some(HistoryEnd::Cancelled);
                        return None;
                    }
                }
                RetryDecision::GiveUp => {
                    warn!(
                        "❌ Skipping history page {} after {} attempts: {}",
                        page_number, attempt, error
                    );
                    self.step_past_page();
                    return Some(PageResult::Skipped {
                        page_number,
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

/// Listing navigation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    NotStarted,
    HasNext,
    Exhausted,
    Error(NavigationError),
}

/// Why a listing paginator stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEnd {
    /// Last page reached: the next control was disabled or absent, or the indicator said so
    Exhausted,
    PageCap,
    Cancelled,
    NavigationFailed(NavigationError),
}

/// One page of live listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    pub page_number: u32,
    pub page: RenderedPage,
}

pub struct ListingPaginator<'a, S: PageSource + ?Sized> {
    source: &'a mut S,
    navigator: &'a PageNavigator,
    retry: RetryPolicy,
    cancel: CancellationToken,
    max_pages: Option<u32>,
    state: NavState,
    pages_yielded: u32,
    indicator: Option<PageIndicator>,
    end: Option<ListingEnd>,
}

impl<'a, S: PageSource + ?Sized> ListingPaginator<'a, S> {
    pub fn new(
        source: &'a mut S,
        navigator: &'a PageNavigator,
        retry: RetryPolicy,
        cancel: CancellationToken,
        max_pages: Option<u32>,
    ) -> Self {
        Self {
            source,
            navigator,
            retry,
            cancel,
            max_pages,
            state: NavState::NotStarted,
            pages_yielded: 0,
            indicator: None,
            end: None,
        }
    }

    pub fn state(&self) -> &NavState {
        &self.state
    }

    pub fn end(&self) -> Option<&ListingEnd> {
        self.end.as_ref()
    }

    fn finish(&mut self, end: ListingEnd) -> Option<ListingPage> {
        match &end {
            ListingEnd::NavigationFailed(error) => self.state = NavState::Error(error.clone()),
            ListingEnd::Exhausted => self.state = NavState::Exhausted,
            ListingEnd::PageCap | ListingEnd::Cancelled => {}
        }
        info!("Listing pagination ended after {} pages: {:?}", self.pages_yielded, end);
        self.end = Some(end);
        None
    }

    fn read_indicator(&self, page: &RenderedPage) -> Option<PageIndicator> {
        let document = Html::parse_document(&page.html);
        self.navigator.page_indicator(&document)
    }

    fn accept(&mut self, page: RenderedPage, indicator: Option<PageIndicator>) -> ListingPage {
        self.pages_yielded += 1;
        self.indicator = indicator;
        self.state = NavState::HasNext;
        let page_number = indicator.map_or(self.pages_yielded, |i| i.current);
        debug!("Listing page {} ready ({})", page_number, page.url);
        ListingPage { page_number, page }
    }

    pub async fn next(&mut self) -> Option<ListingPage> {
        if self.end.is_some() {
            return None;
        }
        if self.cancel.is_cancelled() {
            return self.finish(ListingEnd::Cancelled);
        }
        if self.max_pages.is_some_and(|cap| self.pages_yielded >= cap) {
            return self.finish(ListingEnd::PageCap);
        }

        match self.state.clone() {
            NavState::NotStarted => self.open_first().await,
            NavState::HasNext => {
                if self.indicator.is_some_and(|i| i.is_last()) {
                    return self.finish(ListingEnd::Exhausted);
                }
                self.advance().await
            }
            NavState::Exhausted | NavState::Error(_) => None,
        }
    }

    async fn open_first(&mut self) -> Option<ListingPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.source.open_listings().await {
                Ok(page) => {
                    let indicator = self.read_indicator(&page);
                    return Some(self.accept(page, indicator));
                }
                Err(NavigationError::PageNotFound { .. }) => {
                    return self.finish(ListingEnd::Exhausted);
                }
                Err(error) => error,
            };

            if let Some(end) = self.retry_or_end(attempt, error).await {
                return self.finish(end);
            }
        }
    }

    async fn advance(&mut self) -> Option<ListingPage> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.step().await {
                Ok(Some((page, indicator))) => return Some(self.accept(page, indicator)),
                Ok(None) => return self.finish(ListingEnd::Exhausted),
                Err(NavigationError::PageNotFound { .. }) => {
                    return self.finish(ListingEnd::Exhausted);
                }
                Err(error) => error,
            };

            if let Some(end) = self.retry_or_end(attempt, error).await {
                return self.finish(end);
            }
        }
    }

    /// One attempt at moving forward. `Ok(None)` means there is no next page.
    async fn step(&mut self) -> Result<Option<(RenderedPage, Option<PageIndicator>)>, NavigationError> {
        match self.source.next_control().await? {
            NextControl::Disabled | NextControl::Absent => return Ok(None),
            NextControl::Enabled => {}
        }

        let page = self.source.click_next().await?;
        let indicator = self.read_indicator(&page);

        if let (Some(before), Some(after)) = (self.indicator, indicator) {
            if after.current <= before.current {
                return Err(NavigationError::stale(format!(
                    "page indicator stayed at {} of {} after clicking next",
                    after.current, after.total
                )));
            }
        }
        Ok(Some((page, indicator)))
    }

    /// `None` to try again after backing off, or the end reason when giving up
    async fn retry_or_end(&mut self, attempt: u32, error: NavigationError) -> Option<ListingEnd> {
        match self.retry.decide(attempt, &error) {
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    "🔄 Listing navigation attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, self.retry.max_attempts, error, delay
                );
                if wait_or_cancel(&self.cancel, delay).await {
                    None
                } else {
                    Some(ListingEnd::Cancelled)
                }
            }
            RetryDecision::GiveUp => {
                warn!("❌ Listing navigation failed after {} attempts: {}", attempt, error);
                Some(ListingEnd::NavigationFailed(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::infrastructure::page_source::ReplayPageSource;
    use crate::infrastructure::page_source::replay_source::ReplayPages;

    fn source(pages: u32) -> ReplayPageSource {
        let replay = (1..=pages).fold(ReplayPages::new(), |replay, n| {
            replay.with_history_page(n, format!("<p>{n}</p>"))
        });
        ReplayPageSource::new(Arc::new(replay), Arc::new(PageNavigator::new().unwrap()))
    }

    #[tokio::test]
    async fn yields_pages_in_order_and_skips_permanent_failures() {
        let mut source = source(4).fail_history_page(
            2,
            NavigationError::InvalidTarget {
                target: "history 2".to_string(),
            },
            1,
        );
        let mut paginator =
            HistoryPaginator::new(&mut source, 1, 3, RetryPolicy::immediate(3), CancellationToken::new());

        let mut seen = Vec::new();
        while let Some(result) = paginator.next().await {
            let fetched = matches!(result, PageResult::Fetched { .. });
            seen.push((result.page_number(), fetched));
        }
        assert_eq!(seen, vec![(1, true), (2, false), (3, true)]);
        assert_eq!(paginator.end(), Some(HistoryEnd::Completed));
    }

    #[tokio::test]
    async fn missing_page_ends_the_walk() {
        let mut source = source(2);
        let mut paginator =
            HistoryPaginator::new(&mut source, 1, 5, RetryPolicy::immediate(3), CancellationToken::new());

        let mut count = 0;
        while paginator.next().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
        assert_eq!(paginator.end(), Some(HistoryEnd::EndOfList { page_number: 3 }));
    }

    #[tokio::test]
    async fn walk_ends_at_the_highest_page_number() {
        let replay = ReplayPages::new()
            .with_history_page(u32::MAX - 1, "<p>penultimate</p>")
            .with_history_page(u32::MAX, "<p>last</p>");
        let mut source = ReplayPageSource::new(Arc::new(replay), Arc::new(PageNavigator::new().unwrap()));
        let mut paginator = HistoryPaginator::new(
            &mut source,
            u32::MAX - 1,
            u32::MAX,
            RetryPolicy::immediate(3),
            CancellationToken::new(),
        );

        let mut seen = Vec::new();
        while let Some(result) = paginator.next().await {
            seen.push(result.page_number());
        }
        assert_eq!(seen, vec![u32::MAX - 1, u32::MAX]);
        assert_eq!(paginator.end(), Some(HistoryEnd::Completed));
    }
}
