//! End-to-end history crawl tests over replayed pages

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use sk_market_scout::application::HistoryCrawl;
use sk_market_scout::crawling::{BatchWorkerPool, CrawlPlan, WorkerError};
use sk_market_scout::domain::CheckpointLedger;
use sk_market_scout::infrastructure::config::AppConfig;
use sk_market_scout::infrastructure::history_store::{
    BatchFlush, BatchSink, HistoryStore, MergeOutcome, StoreError, StoreResult,
};
use sk_market_scout::infrastructure::page_source::replay_source::ReplayPages;
use sk_market_scout::infrastructure::page_source::{NavigationError, ReplayPageSourceFactory};
use sk_market_scout::infrastructure::parsing::{HistoryExtractor, PageNavigator};
use sk_market_scout::infrastructure::retry_manager::RetryPolicy;

fn row(name: &str, price: &str) -> String {
    format!(
        r#"<tr>
             <td><span>{name}</span></td>
             <td><div class="flex justify-end">{price}</div></td>
             <td><div class="flex justify-end">01/15/2025</div><small>3:04:05 PM</small></td>
           </tr>"#
    )
}

fn history_page(rows: &[String]) -> String {
    format!(
        "<html><body><main><div>Sales</div><div><table><tbody>{}</tbody></table></div></main></body></html>",
        rows.concat()
    )
}

/// One sale per page: "Item {n}" sold for n * 10
fn pages(count: u32) -> ReplayPages {
    (1..=count).fold(ReplayPages::new(), |pages, n| {
        pages.with_history_page(n, history_page(&[row(&format!("Item {n}"), &(n * 10).to_string())]))
    })
}

fn plan(end_page: u32, worker_count: usize, batch_size: u32) -> CrawlPlan {
    CrawlPlan {
        start_page: 1,
        end_page,
        worker_count,
        batch_size,
    }
}

fn navigator() -> Arc<PageNavigator> {
    Arc::new(PageNavigator::new().unwrap())
}

fn pool(
    plan: CrawlPlan,
    factory: Arc<ReplayPageSourceFactory>,
    sink: Arc<dyn BatchSink>,
    flush_attempts: u32,
) -> BatchWorkerPool {
    BatchWorkerPool::new(
        plan,
        factory,
        sink,
        Arc::new(HistoryExtractor::new().unwrap()),
        CancellationToken::new(),
    )
    .with_retry_policies(RetryPolicy::immediate(3), RetryPolicy::immediate(flush_attempts))
}

#[tokio::test]
async fn resumes_after_last_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));
    let plan = plan(6, 1, 2);

    let mut ledger = CheckpointLedger::new(plan.fingerprint());
    ledger.record_flush(0, 1, 6, 3, &[]);
    store.save_checkpoints(&ledger).await.unwrap();

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(6), navigator()));
    let summary = pool(plan, Arc::clone(&factory), store.clone(), 1).run().await.unwrap();

    assert_eq!(factory.requested_pages(), vec![4, 5, 6]);
    assert_eq!(summary.reports[0].resumed_from, Some(4));
    assert_eq!(summary.pages_processed(), 3);

    let history = store.load().await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.contains_key("Item 4"));
    assert!(!history.contains_key("Item 1"));

    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert!(ledger.checkpoint(0).unwrap().is_complete());
}

#[tokio::test]
async fn completed_plan_requests_nothing_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));

    let first = Arc::new(ReplayPageSourceFactory::new(pages(4), navigator()));
    let summary = pool(plan(4, 2, 2), first, store.clone(), 1).run().await.unwrap();
    assert_eq!(summary.records_appended(), 4);

    let second = Arc::new(ReplayPageSourceFactory::new(pages(4), navigator()));
    let summary = pool(plan(4, 2, 2), Arc::clone(&second), store.clone(), 1)
        .run()
        .await
        .unwrap();
    assert!(second.requested_pages().is_empty());
    assert_eq!(summary.records_appended(), 0);
    assert_eq!(sk_market_scout::domain::history::total_entries(&store.load().await.unwrap()), 4);
}

#[tokio::test]
async fn changed_plan_discards_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));

    let mut stale = CheckpointLedger::new("some other plan");
    stale.record_flush(0, 1, 3, 3, &[]);
    store.save_checkpoints(&stale).await.unwrap();

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(3), navigator()));
    pool(plan(3, 1, 5), Arc::clone(&factory), store.clone(), 1)
        .run()
        .await
        .unwrap();

    assert_eq!(factory.requested_pages(), vec![1, 2, 3]);
    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert_eq!(ledger.plan_fingerprint, plan(3, 1, 5).fingerprint());
}

#[tokio::test]
async fn malformed_row_is_dropped_and_batch_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));

    let replay = pages(3).with_history_page(
        2,
        history_page(&[row("Item 2", "20"), row("Sun Shards", "N/A")]),
    );
    let factory = Arc::new(ReplayPageSourceFactory::new(replay, navigator()));
    let summary = pool(plan(3, 1, 3), factory, store.clone(), 1).run().await.unwrap();

    assert_eq!(summary.pages_processed(), 3);
    assert_eq!(summary.rows_dropped(), 1);
    assert_eq!(summary.records_appended(), 3);
    assert!(!summary.has_halted_workers());

    let history = store.load().await.unwrap();
    assert!(!history.contains_key("Sun Shards"));
    assert_eq!(history["Item 2"][0].price, Decimal::from(20));
}

#[tokio::test]
async fn transient_failures_are_retried_then_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));

    let factory = Arc::new(
        ReplayPageSourceFactory::new(pages(4), navigator()).with_customizer(|_, source| {
            source
                .fail_history_page(2, NavigationError::timeout("history page 2"), 1)
                .fail_history_page(3, NavigationError::timeout("history page 3"), 5)
        }),
    );
    let summary = pool(plan(4, 1, 10), Arc::clone(&factory), store.clone(), 1)
        .run()
        .await
        .unwrap();

    assert_eq!(factory.requested_pages(), vec![1, 2, 2, 3, 3, 3, 4]);
    assert_eq!(summary.pages_processed(), 3);
    assert_eq!(summary.pages_skipped(), 1);
    assert_eq!(summary.failed_pages(), vec![3]);

    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert!(ledger.failed_pages.contains(&3));
    assert!(ledger.checkpoint(0).unwrap().is_complete());
}

#[tokio::test]
async fn end_of_history_completes_the_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(3), navigator()));
    let summary = pool(plan(5, 1, 2), Arc::clone(&factory), store.clone(), 1)
        .run()
        .await
        .unwrap();

    assert_eq!(factory.requested_pages(), vec![1, 2, 3, 4]);
    assert_eq!(summary.pages_processed(), 3);
    assert_eq!(summary.pages_skipped(), 0);

    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert_eq!(ledger.checkpoint(0).unwrap().last_completed_page, Some(5));
}

/// Delegates to a real store but rejects every flush from one worker
struct FailingSink {
    inner: HistoryStore,
    failing_worker: usize,
}

#[async_trait]
impl BatchSink for FailingSink {
    async fn load_checkpoints(&self) -> StoreResult<Option<CheckpointLedger>> {
        self.inner.load_checkpoints().await
    }

    async fn save_checkpoints(&self, ledger: &CheckpointLedger) -> StoreResult<()> {
        self.inner.save_checkpoints(ledger).await
    }

    async fn flush_batch(&self, flush: &BatchFlush, label: &str) -> StoreResult<MergeOutcome> {
        if flush.worker_id == self.failing_worker {
            return Err(StoreError::Io {
                path: self.inner.store_path().to_path_buf(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.flush_batch(flush, label).await
    }
}

#[tokio::test]
async fn persistence_failure_halts_only_that_worker() {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(FailingSink {
        inner: HistoryStore::new(dir.path()),
        failing_worker: 1,
    });

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(4), navigator()));
    let summary = pool(plan(4, 2, 2), factory, sink.clone(), 2).run().await.unwrap();

    assert!(summary.has_halted_workers());
    let halted = summary.halted_workers();
    assert_eq!(halted.len(), 1);
    assert_eq!(halted[0].worker_id, 1);
    assert!(matches!(
        halted[0].halted,
        Some(WorkerError::Persistence { attempts: 2, .. })
    ));

    let healthy = &summary.reports[0];
    assert!(healthy.halted.is_none());
    assert_eq!(healthy.batches_flushed, 1);

    let history = sink.inner.load().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.contains_key("Item 1") && history.contains_key("Item 2"));

    let ledger = sink.inner.load_checkpoints().await.unwrap().unwrap();
    assert!(ledger.checkpoint(0).unwrap().is_complete());
    assert!(ledger.checkpoint(1).is_none());
}

#[tokio::test]
async fn history_crawl_use_case_runs_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.crawl.total_pages = 3;
    config.crawl.worker_count = 2;
    config.crawl.batch_size = 1;
    config.crawl.retry_base_delay_ms = 0;
    config.crawl.retry_max_delay_ms = 0;

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(3), navigator()));
    let crawl = HistoryCrawl::new(config, factory);
    assert_eq!(crawl.plan().partition().len(), 2);

    let summary = crawl.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.records_appended(), 3);
    assert_eq!(summary.batches_flushed(), 3);

    let store = HistoryStore::new(dir.path());
    assert_eq!(store.load().await.unwrap().len(), 3);
}

#[tokio::test]
async fn cancelled_crawl_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(HistoryStore::new(dir.path()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let factory = Arc::new(ReplayPageSourceFactory::new(pages(3), navigator()));
    let summary = BatchWorkerPool::new(
        plan(3, 1, 2),
        factory.clone(),
        store,
        Arc::new(HistoryExtractor::new().unwrap()),
        cancel,
    )
    .run()
    .await
    .unwrap();

    assert!(factory.requested_pages().is_empty());
    assert!(summary.was_cancelled());
}
