//! Page source capability
//!
//! A page source is whatever can hand back rendered HTML for a history page
//! number or step through the live listings with a "Next" control. Workers
//! own one source each; sources are created by a [`PageSourceFactory`].

pub mod http_source;
pub mod replay_source;

pub use http_source::{HttpPageSource, HttpPageSourceFactory};
pub use replay_source::{ReplayPageSource, ReplayPageSourceFactory};

use async_trait::async_trait;
use thiserror::Error;

/// Rendered page content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

impl RenderedPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// State of the listings "Next" control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Enabled,
    Disabled,
    Absent,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Timed out loading {target}")]
    Timeout { target: String },

    #[error("Stale navigation control: {detail}")]
    StaleElement { detail: String },

    #[error("Navigation control '{control}' not found")]
    MissingControl { control: String },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Page {page_number} does not exist")]
    PageNotFound { page_number: u32 },

    #[error("Invalid navigation target: {target}")]
    InvalidTarget { target: String },
}

impl NavigationError {
    pub fn stale(detail: impl Into<String>) -> Self {
        Self::StaleElement {
            detail: detail.into(),
        }
    }

    pub fn timeout(target: impl Into<String>) -> Self {
        Self::Timeout {
            target: target.into(),
        }
    }

    /// Worth retrying: timeouts, stale or missing controls, transport errors, 5xx and 429
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::StaleElement { .. }
            | Self::MissingControl { .. }
            | Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::PageNotFound { .. } | Self::InvalidTarget { .. } => false,
        }
    }
}

/// Classified result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Page(RenderedPage),
    TransientFailure(NavigationError),
    /// The source has no such page; pagination is over
    EndOfList,
    Failed(NavigationError),
}

impl From<Result<RenderedPage, NavigationError>> for FetchOutcome {
    fn from(result: Result<RenderedPage, NavigationError>) -> Self {
        match result {
            Ok(page) => Self::Page(page),
            Err(NavigationError::PageNotFound { .. }) => Self::EndOfList,
            Err(e) if e.is_transient() => Self::TransientFailure(e),
            Err(e) => Self::Failed(e),
        }
    }
}

#[async_trait]
pub trait PageSource: Send {
    /// Direct addressing of a history page (1-based)
    async fn open_history_page(&mut self, page_number: u32) -> Result<RenderedPage, NavigationError>;

    /// Open the first page of the live listings
    async fn open_listings(&mut self) -> Result<RenderedPage, NavigationError>;

    /// Inspect the "Next" control on the current listings page
    async fn next_control(&mut self) -> Result<NextControl, NavigationError>;

    /// Activate the "Next" control and return the page it leads to
    async fn click_next(&mut self) -> Result<RenderedPage, NavigationError>;
}

pub trait PageSourceFactory: Send + Sync {
    fn create(&self, worker_id: usize) -> anyhow::Result<Box<dyn PageSource>>;
}
