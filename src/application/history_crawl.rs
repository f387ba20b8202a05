//! History crawl use case: wires configuration, store, extractor and worker pool

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::crawling::{BatchWorkerPool, CrawlPlan, CrawlSummary};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::history_store::{BatchSink, HistoryStore};
use crate::infrastructure::page_source::PageSourceFactory;
use crate::infrastructure::parsing::HistoryExtractor;
use crate::infrastructure::retry_manager::RetryPolicy;

pub struct HistoryCrawl {
    config: AppConfig,
    factory: Arc<dyn PageSourceFactory>,
    sink: Arc<dyn BatchSink>,
}

impl HistoryCrawl {
    /// Crawl into the [`HistoryStore`] under `config.storage.data_dir`
    pub fn new(config: AppConfig, factory: Arc<dyn PageSourceFactory>) -> Self {
        let store = Arc::new(HistoryStore::new(config.storage.data_dir.clone()));
        Self::with_sink(config, factory, store)
    }

    pub fn with_sink(config: AppConfig, factory: Arc<dyn PageSourceFactory>, sink: Arc<dyn BatchSink>) -> Self {
        Self { config, factory, sink }
    }

    pub fn plan(&self) -> CrawlPlan {
        CrawlPlan::from_config(&self.config.crawl)
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<CrawlSummary> {
        self.config.validate().context("Invalid crawl configuration")?;

        let extractor = HistoryExtractor::with_config(&self.config.selectors)
            .context("Invalid history selectors")?;
        let plan = self.plan();
        info!(
            "📜 Starting history crawl: pages {}-{}, {} workers, data dir {:?}",
            plan.start_page, plan.end_page, plan.worker_count, self.config.storage.data_dir
        );

        let pool = BatchWorkerPool::new(
            plan,
            Arc::clone(&self.factory),
            Arc::clone(&self.sink),
            Arc::new(extractor),
            cancel,
        )
        .with_retry_policies(
            RetryPolicy::from_config(&self.config.crawl),
            RetryPolicy::for_flushes(&self.config.crawl),
        );

        pool.run().await
    }
}
