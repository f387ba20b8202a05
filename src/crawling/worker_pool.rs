//! Batch worker pool for the history crawl
//!
//! The page range is split into one contiguous chunk per worker. Each worker
//! owns a page source, extracts every page it fetches, and flushes its
//! accumulated records every `batch_size` pages. A worker whose flush keeps
//! failing halts; the others carry on.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::paginator::{HistoryEnd, HistoryPaginator, PageResult};
use super::summary::{CrawlSummary, WorkerReport};
use crate::domain::checkpoint::CheckpointLedger;
use crate::domain::history::HistoryRecord;
use crate::infrastructure::config::CrawlConfig;
use crate::infrastructure::history_store::{BatchFlush, BatchSink, MergeOutcome, StoreError};
use crate::infrastructure::page_source::PageSourceFactory;
use crate::infrastructure::parsing::{ContextualParser, HistoryExtractor, ParseContext};
use crate::infrastructure::retry_manager::{RetryDecision, RetryPolicy};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Page source unavailable for worker {worker_id}: {message}")]
    SourceUnavailable { worker_id: usize, message: String },

    #[error("Flush of pages {first_page}-{last_page} failed after {attempts} attempts: {source}")]
    Persistence {
        worker_id: usize,
        first_page: u32,
        last_page: u32,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("Worker {worker_id} task failed: {message}")]
    TaskFailed { worker_id: usize, message: String },
}

/// A worker's contiguous slice of the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub worker_id: usize,
    pub first: u32,
    pub last: u32,
}

impl PageRange {
    pub fn len(&self) -> u32 {
        self.last.saturating_add(1).saturating_sub(self.first)
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

/// Pages to crawl and how to split them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlPlan {
    pub start_page: u32,
    pub end_page: u32,
    pub worker_count: usize,
    pub batch_size: u32,
}

impl CrawlPlan {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            start_page: config.start_page,
            end_page: config.total_pages,
            worker_count: config.worker_count,
            batch_size: config.batch_size,
        }
    }

    pub fn page_count(&self) -> u32 {
        if self.end_page < self.start_page {
            0
        } else {
            self.end_page - self.start_page + 1
        }
    }

    /// Contiguous chunks, sizes differing by at most one, no empty chunks
    pub fn partition(&self) -> Vec<PageRange> {
        let total = self.page_count();
        if total == 0 || self.worker_count == 0 {
            return Vec::new();
        }

        let workers = (self.worker_count as u32).min(total);
        let base = total / workers;
        let remainder = total % workers;

        let mut ranges = Vec::with_capacity(workers as usize);
        let mut first = self.start_page;
        for worker_id in 0..workers {
            let size = base + u32::from(worker_id < remainder);
            let last = first + size - 1;
            ranges.push(PageRange {
                worker_id: worker_id as usize,
                first,
                last,
            });
            first = last.saturating_add(1);
        }
        ranges
    }

    /// Identity of the page split; checkpoints are only reused under the same fingerprint
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.start_page.to_le_bytes());
        hasher.update(&self.end_page.to_le_bytes());
        hasher.update(&(self.worker_count as u64).to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Everything one worker task needs, owned so the task can be spawned
struct WorkerContext {
    range: PageRange,
    resume_page: u32,
    plan_fingerprint: String,
    batch_size: u32,
    factory: Arc<dyn PageSourceFactory>,
    sink: Arc<dyn BatchSink>,
    extractor: Arc<HistoryExtractor>,
    retry: RetryPolicy,
    flush_retry: RetryPolicy,
    cancel: CancellationToken,
}

/// Pages accumulated since the last flush
struct PendingBatch {
    first_page: u32,
    pages: u32,
    completed_through: Option<u32>,
    records: Vec<HistoryRecord>,
    failed_pages: Vec<u32>,
}

impl PendingBatch {
    fn starting_at(first_page: u32) -> Self {
        Self {
            first_page,
            pages: 0,
            completed_through: None,
            records: Vec::new(),
            failed_pages: Vec::new(),
        }
    }

    fn push_page(&mut self, page_number: u32) {
        self.pages += 1;
        self.completed_through = Some(page_number);
    }
}

pub struct BatchWorkerPool {
    plan: CrawlPlan,
    factory: Arc<dyn PageSourceFactory>,
    sink: Arc<dyn BatchSink>,
    extractor: Arc<HistoryExtractor>,
    retry: RetryPolicy,
    flush_retry: RetryPolicy,
    cancel: CancellationToken,
}

impl BatchWorkerPool {
    pub fn new(
        plan: CrawlPlan,
        factory: Arc<dyn PageSourceFactory>,
        sink: Arc<dyn BatchSink>,
        extractor: Arc<HistoryExtractor>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            plan,
            factory,
            sink,
            extractor,
            retry: RetryPolicy::default(),
            flush_retry: RetryPolicy::default(),
            cancel,
        }
    }

    pub fn with_retry_policies(mut self, retry: RetryPolicy, flush_retry: RetryPolicy) -> Self {
        self.retry = retry;
        self.flush_retry = flush_retry;
        self
    }

    pub fn plan(&self) -> &CrawlPlan {
        &self.plan
    }

    /// Checkpoints for this plan, discarding any left by a different plan
    async fn prepare_ledger(&self, fingerprint: &str) -> Result<CheckpointLedger> {
        let existing = self
            .sink
            .load_checkpoints()
            .await
            .context("Failed to load crawl checkpoints")?;

        match existing {
            Some(ledger) if ledger.matches_plan(fingerprint) => {
                info!("📍 Resuming from {} worker checkpoints", ledger.checkpoints.len());
                Ok(ledger)
            }
            other => {
                if other.is_some() {
                    warn!("⚠️ Crawl plan changed since the last run; discarding old checkpoints");
                }
                let ledger = CheckpointLedger::new(fingerprint);
                self.sink
                    .save_checkpoints(&ledger)
                    .await
                    .context("Failed to reset crawl checkpoints")?;
                Ok(ledger)
            }
        }
    }

    /// Run every worker to completion (or cancellation) and collect their reports
    pub async fn run(&self) -> Result<CrawlSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let fingerprint = self.plan.fingerprint();
        let ranges = self.plan.partition();

        info!(
            "🚀 Crawl {} over pages {}-{} with {} workers (batch size {})",
            run_id,
            self.plan.start_page,
            self.plan.end_page,
            ranges.len(),
            self.plan.batch_size
        );

        let ledger = self.prepare_ledger(&fingerprint).await?;

        let mut reports = Vec::with_capacity(ranges.len());
        let mut handles = Vec::with_capacity(ranges.len());

        for range in ranges {
            let resume_page = match ledger.checkpoint(range.worker_id) {
                Some(checkpoint) => checkpoint.resume_page(),
                None => Some(range.first),
            };
            let Some(resume_page) = resume_page else {
                info!(
                    "✅ Worker {} chunk {}-{} already complete",
                    range.worker_id, range.first, range.last
                );
                reports.push(WorkerReport::new(range.worker_id, range, None));
                continue;
            };

            let context = WorkerContext {
                range,
                resume_page,
                plan_fingerprint: fingerprint.clone(),
                batch_size: self.plan.batch_size,
                factory: Arc::clone(&self.factory),
                sink: Arc::clone(&self.sink),
                extractor: Arc::clone(&self.extractor),
                retry: self.retry.clone(),
                flush_retry: self.flush_retry.clone(),
                cancel: self.cancel.clone(),
            };
            handles.push((range, tokio::spawn(run_worker(context))));
        }

        let (spawned_ranges, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (range, joined) in spawned_ranges.into_iter().zip(join_all(tasks).await) {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Worker {} task failed: {}", range.worker_id, e);
                    reports.push(WorkerReport::failed(
                        range.worker_id,
                        range,
                        WorkerError::TaskFailed {
                            worker_id: range.worker_id,
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
        reports.sort_by_key(|r| r.worker_id);

        let summary = CrawlSummary {
            run_id,
            started_at,
            elapsed: clock.elapsed(),
            plan_fingerprint: fingerprint,
            reports,
        };
        info!(
            "🏁 Crawl {} finished: {} pages processed, {} skipped, {} records appended",
            run_id,
            summary.pages_processed(),
            summary.pages_skipped(),
            summary.records_appended()
        );
        Ok(summary)
    }
}

async fn run_worker(ctx: WorkerContext) -> WorkerReport {
    let range = ctx.range;
    let mut report = WorkerReport::new(range.worker_id, range, Some(ctx.resume_page));

    let mut source = match ctx.factory.create(range.worker_id) {
        Ok(source) => source,
        Err(e) => {
            error!("Worker {} could not create a page source: {:#}", range.worker_id, e);
            report.halted = Some(WorkerError::SourceUnavailable {
                worker_id: range.worker_id,
                message: format!("{e:#}"),
            });
            return report;
        }
    };

    info!(
        "👷 Worker {} crawling pages {}-{}",
        range.worker_id, ctx.resume_page, range.last
    );

    let mut paginator = HistoryPaginator::new(
        source.as_mut(),
        ctx.resume_page,
        range.last,
        ctx.retry.clone(),
        ctx.cancel.clone(),
    );
    let mut batch = PendingBatch::starting_at(ctx.resume_page);

    while let Some(result) = paginator.next().await {
        match result {
            PageResult::Fetched { page_number, page, .. } => {
                let extraction = ctx
                    .extractor
                    .parse_str(&page.html, &ParseContext::new(page_number, page.url.as_str()));
                report.pages_processed += 1;
                report.records_extracted += extraction.records.len();
                report.rows_dropped += extraction.dropped.len();
                batch.records.extend(extraction.records);
                batch.push_page(page_number);
            }
            PageResult::Skipped { page_number, .. } => {
                report.pages_skipped += 1;
                report.failed_pages.push(page_number);
                batch.failed_pages.push(page_number);
                batch.push_page(page_number);
            }
        }

        if batch.pages >= ctx.batch_size {
            let next_first = batch.completed_through.map_or(range.last, |p| p.saturating_add(1));
            let full = std::mem::replace(&mut batch, PendingBatch::starting_at(next_first));
            if !flush(&ctx, full, &mut report).await {
                return report;
            }
        }
    }

    match paginator.end() {
        Some(HistoryEnd::EndOfList { page_number }) => {
            info!(
                "Worker {}: history ends at page {}; marking chunk complete",
                range.worker_id, page_number
            );
            batch.completed_through = Some(range.last);
        }
        Some(HistoryEnd::Cancelled) => {
            report.cancelled = true;
        }
        Some(HistoryEnd::Completed) | None => {}
    }

    if batch.completed_through.is_some() {
        flush(&ctx, batch, &mut report).await;
    }

    info!(
        "Worker {} done: {} pages processed, {} skipped",
        range.worker_id, report.pages_processed, report.pages_skipped
    );
    report
}

/// Persist one batch, retrying with backoff. Returns `false` if the worker must halt.
async fn flush(ctx: &WorkerContext, batch: PendingBatch, report: &mut WorkerReport) -> bool {
    let Some(completed_through) = batch.completed_through else {
        return true;
    };

    let flush = BatchFlush {
        plan_fingerprint: ctx.plan_fingerprint.clone(),
        worker_id: ctx.range.worker_id,
        first_page: ctx.range.first,
        last_page: ctx.range.last,
        completed_through,
        failed_pages: batch.failed_pages,
        records: batch.records,
    };
    let label = flush.label(batch.first_page);

    match flush_with_retry(ctx, &flush, &label).await {
        Ok(outcome) => {
            report.records_appended += outcome.appended;
            report.duplicates_skipped += outcome.duplicates;
            report.batches_flushed += 1;
            true
        }
        Err(e) => {
            error!("🛑 Worker {} halted: {}", ctx.range.worker_id, e);
            report.halted = Some(e);
            false
        }
    }
}

async fn flush_with_retry(
    ctx: &WorkerContext,
    flush: &BatchFlush,
    label: &str,
) -> Result<MergeOutcome, WorkerError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match ctx.sink.flush_batch(flush, label).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => match ctx.flush_retry.decide_attempt(attempt) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "🔄 Flush {} attempt {}/{} failed: {}; retrying in {:?}",
                        label, attempt, ctx.flush_retry.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    return Err(WorkerError::Persistence {
                        worker_id: flush.worker_id,
                        first_page: flush.first_page,
                        last_page: flush.completed_through,
                        attempts: attempt,
                        source: e,
                    });
                }
            },
        }
    }
}
