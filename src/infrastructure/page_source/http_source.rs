//! Page source over plain HTTP for server-rendered pages

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use scraper::Html;
use tracing::{debug, info};
use url::Url;

use super::{NavigationError, NextControl, PageSource, PageSourceFactory, RenderedPage};
use crate::infrastructure::config::SiteConfig;
use crate::infrastructure::parsing::{NextLink, PageNavigator};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Current position in the live listings
#[derive(Debug, Clone)]
struct ListingCursor {
    page_number: u32,
    page: RenderedPage,
}

/// Fetches history pages by number and walks listings by following the next link
pub struct HttpPageSource {
    client: Client,
    base_url: Url,
    history_url: Url,
    rate_limiter: Option<DirectRateLimiter>,
    navigator: Arc<PageNavigator>,
    cursor: Option<ListingCursor>,
}

impl HttpPageSource {
    pub fn new(site: &SiteConfig, navigator: Arc<PageNavigator>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&site.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_millis(site.request_timeout_ms))
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&site.base_url)
            .with_context(|| format!("Invalid base URL: {}", site.base_url))?;
        let history_url = base_url
            .join(&site.history_path)
            .with_context(|| format!("Invalid history path: {}", site.history_path))?;

        let rate_limiter = Quota::with_period(Duration::from_millis(site.request_delay_ms))
            .map(RateLimiter::direct);

        Ok(Self {
            client,
            base_url,
            history_url,
            rate_limiter,
            navigator,
            cursor: None,
        })
    }

    pub fn history_page_url(&self, page_number: u32) -> Url {
        with_page(&self.history_url, page_number)
    }

    pub fn listings_page_url(&self, page_number: u32) -> Url {
        with_page(&self.base_url, page_number)
    }

    async fn fetch(&self, url: &Url, page_number: u32) -> Result<RenderedPage, NavigationError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        debug!("Fetching URL: {}", url);
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                NavigationError::timeout(url.as_str())
            } else {
                NavigationError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(NavigationError::PageNotFound { page_number });
        }
        if !status.is_success() {
            return Err(NavigationError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| NavigationError::Transport {
            url: url.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        debug!("Fetched {} ({} chars)", final_url, html.len());
        Ok(RenderedPage::new(final_url, html))
    }

    fn current_next_link(&self) -> Result<(NextLink, &ListingCursor), NavigationError> {
        let cursor = self.cursor.as_ref().ok_or_else(|| NavigationError::InvalidTarget {
            target: "listings have not been opened".to_string(),
        })?;
        let document = Html::parse_document(&cursor.page.html);
        Ok((self.navigator.next_link(&document), cursor))
    }

    fn indicated_page(&self, page: &RenderedPage) -> Option<u32> {
        let document = Html::parse_document(&page.html);
        self.navigator.page_indicator(&document).map(|i| i.current)
    }
}

fn with_page(url: &Url, page_number: u32) -> Url {
    let mut url = url.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair("page", &page_number.to_string());
    url
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn open_history_page(&mut self, page_number: u32) -> Result<RenderedPage, NavigationError> {
        if page_number == 0 {
            return Err(NavigationError::InvalidTarget {
                target: "history page 0".to_string(),
            });
        }
        let url = self.history_page_url(page_number);
        self.fetch(&url, page_number).await
    }

    async fn open_listings(&mut self) -> Result<RenderedPage, NavigationError> {
        let url = self.base_url.clone();
        let page = self.fetch(&url, 1).await?;
        self.cursor = Some(ListingCursor {
            page_number: 1,
            page: page.clone(),
        });
        Ok(page)
    }

    async fn next_control(&mut self) -> Result<NextControl, NavigationError> {
        let (link, _) = self.current_next_link()?;
        Ok(link.control)
    }

    async fn click_next(&mut self) -> Result<RenderedPage, NavigationError> {
        let (target, next_number) = {
            let (link, cursor) = self.current_next_link()?;
            if link.control != NextControl::Enabled {
                return Err(NavigationError::MissingControl {
                    control: "next".to_string(),
                });
            }
            let next_number = cursor.page_number + 1;
            let target = match link.href.as_deref() {
                Some(href) if !href.starts_with('#') && !href.starts_with("javascript:") => {
                    let current = Url::parse(&cursor.page.url).unwrap_or_else(|_| self.base_url.clone());
                    current.join(href).map_err(|e| NavigationError::InvalidTarget {
                        target: format!("{href}: {e}"),
                    })?
                }
                _ => self.listings_page_url(next_number),
            };
            (target, next_number)
        };

        let page = self.fetch(&target, next_number).await?;
        let page_number = self.indicated_page(&page).unwrap_or(next_number);
        info!("Navigated to listings page {}", page_number);
        self.cursor = Some(ListingCursor {
            page_number,
            page: page.clone(),
        });
        Ok(page)
    }
}

/// One HTTP source per worker, each with its own client and pacing
pub struct HttpPageSourceFactory {
    site: SiteConfig,
    navigator: Arc<PageNavigator>,
}

impl HttpPageSourceFactory {
    pub fn new(site: SiteConfig, navigator: Arc<PageNavigator>) -> Self {
        Self { site, navigator }
    }
}

impl PageSourceFactory for HttpPageSourceFactory {
    fn create(&self, worker_id: usize) -> Result<Box<dyn PageSource>> {
        debug!("Creating HTTP page source for worker {}", worker_id);
        let source = HttpPageSource::new(&self.site, Arc::clone(&self.navigator))?;
        Ok(Box::new(source))
    }
}
