//! Per-worker reports and the crawl run summary

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::worker_pool::{PageRange, WorkerError};

/// What one worker did with its chunk
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub range: PageRange,
    /// First page fetched this run; `None` when the checkpoint said the chunk was done
    pub resumed_from: Option<u32>,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub failed_pages: Vec<u32>,
    pub records_extracted: usize,
    pub rows_dropped: usize,
    pub records_appended: usize,
    pub duplicates_skipped: usize,
    pub batches_flushed: usize,
    pub cancelled: bool,
    pub halted: Option<WorkerError>,
}

impl WorkerReport {
    pub fn new(worker_id: usize, range: PageRange, resumed_from: Option<u32>) -> Self {
        Self {
            worker_id,
            range,
            resumed_from,
            pages_processed: 0,
            pages_skipped: 0,
            failed_pages: Vec::new(),
            records_extracted: 0,
            rows_dropped: 0,
            records_appended: 0,
            duplicates_skipped: 0,
            batches_flushed: 0,
            cancelled: false,
            halted: None,
        }
    }

    pub fn failed(worker_id: usize, range: PageRange, error: WorkerError) -> Self {
        let mut report = Self::new(worker_id, range, None);
        report.halted = Some(error);
        report
    }
}

/// Totals for one `history_crawl` run
#[derive(Debug)]
pub struct CrawlSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub plan_fingerprint: String,
    pub reports: Vec<WorkerReport>,
}

impl CrawlSummary {
    fn total(&self, field: impl Fn(&WorkerReport) -> usize) -> usize {
        self.reports.iter().map(field).sum()
    }

    pub fn pages_processed(&self) -> usize {
        self.total(|r| r.pages_processed)
    }

    pub fn pages_skipped(&self) -> usize {
        self.total(|r| r.pages_skipped)
    }

    pub fn records_extracted(&self) -> usize {
        self.total(|r| r.records_extracted)
    }

    pub fn rows_dropped(&self) -> usize {
        self.total(|r| r.rows_dropped)
    }

    pub fn records_appended(&self) -> usize {
        self.total(|r| r.records_appended)
    }

    pub fn duplicates_skipped(&self) -> usize {
        self.total(|r| r.duplicates_skipped)
    }

    pub fn batches_flushed(&self) -> usize {
        self.total(|r| r.batches_flushed)
    }

    /// All skipped pages, ascending
    pub fn failed_pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .reports
            .iter()
            .flat_map(|r| r.failed_pages.iter().copied())
            .collect();
        pages.sort_unstable();
        pages
    }

    pub fn halted_workers(&self) -> Vec<&WorkerReport> {
        self.reports.iter().filter(|r| r.halted.is_some()).collect()
    }

    pub fn has_halted_workers(&self) -> bool {
        self.reports.iter().any(|r| r.halted.is_some())
    }

    pub fn was_cancelled(&self) -> bool {
        self.reports.iter().any(|r| r.cancelled)
    }
}

impl fmt::Display for CrawlSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "History crawl {} ({:.1?})", self.run_id, self.elapsed)?;
        writeln!(f, "  pages processed:    {}", self.pages_processed())?;
        writeln!(f, "  pages skipped:      {}", self.pages_skipped())?;

        let failed = self.failed_pages();
        if failed.is_empty() {
            writeln!(f, "  failed pages:       none")?;
        } else {
            let list: Vec<String> = failed.iter().map(u32::to_string).collect();
            writeln!(f, "  failed pages:       {}", list.join(", "))?;
        }

        writeln!(f, "  records extracted:  {}", self.records_extracted())?;
        writeln!(f, "  rows dropped:       {}", self.rows_dropped())?;
        writeln!(f, "  records appended:   {}", self.records_appended())?;
        writeln!(f, "  duplicates skipped: {}", self.duplicates_skipped())?;
        writeln!(f, "  batches flushed:    {}", self.batches_flushed())?;

        let halted = self.halted_workers();
        if halted.is_empty() {
            write!(f, "  halted workers:     none")
        } else {
            writeln!(f, "  halted workers:     {}", halted.len())?;
            for (i, report) in halted.iter().enumerate() {
                if let Some(error) = &report.halted {
                    write!(f, "    worker {}: {}", report.worker_id, error)?;
                    if i + 1 < halted.len() {
                        writeln!(f)?;
                    }
                }
            }
            Ok(())
        }
    }
}
