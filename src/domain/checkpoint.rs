//! Crawl checkpoints
//!
//! A checkpoint records the last page a worker flushed to the store. The
//! ledger ties checkpoints to the crawl plan that produced them, so a rerun
//! with a different page range or worker count does not resume from stale
//! positions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub worker_id: usize,
    pub first_page: u32,
    pub last_page: u32,
    /// `None` until the worker's first successful flush
    pub last_completed_page: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl BatchCheckpoint {
    pub fn new(worker_id: usize, first_page: u32, last_page: u32) -> Self {
        Self {
            worker_id,
            first_page,
            last_page,
            last_completed_page: None,
            updated_at: Utc::now(),
        }
    }

    /// First page still to be fetched, or `None` when the chunk is done
    pub fn resume_page(&self) -> Option<u32> {
        let next = match self.last_completed_page {
            Some(done) => done.checked_add(1)?,
            None => self.first_page,
        };
        (next <= self.last_page).then_some(next)
    }

    pub fn is_complete(&self) -> bool {
        self.resume_page().is_none()
    }

    /// Move the checkpoint forward. Never moves backwards.
    pub fn advance_to(&mut self, page: u32) {
        let page = page.min(self.last_page);
        if self.last_completed_page.is_none_or(|done| page > done) {
            self.last_completed_page = Some(page);
            self.updated_at = Utc::now();
        }
    }
}

/// Persisted checkpoint state for one crawl plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointLedger {
    pub plan_fingerprint: String,
    #[serde(default)]
    pub checkpoints: BTreeMap<usize, BatchCheckpoint>,
    /// Pages skipped after exhausting retries, kept for a later targeted rerun
    #[serde(default)]
    pub failed_pages: BTreeSet<u32>,
}

impl CheckpointLedger {
    pub fn new(plan_fingerprint: impl Into<String>) -> Self {
        Self {
            plan_fingerprint: plan_fingerprint.into(),
            ..Self::default()
        }
    }

    pub fn matches_plan(&self, fingerprint: &str) -> bool {
        self.plan_fingerprint == fingerprint
    }

    pub fn checkpoint(&self, worker_id: usize) -> Option<&BatchCheckpoint> {
        self.checkpoints.get(&worker_id)
    }

    /// Record a flushed range for a worker, creating its checkpoint if needed
    pub fn record_flush(
        &mut self,
        worker_id: usize,
        first_page: u32,
        last_page: u32,
        completed_through: u32,
        failed: &[u32],
    ) {
        self.checkpoints
            .entry(worker_id)
            .or_insert_with(|| BatchCheckpoint::new(worker_id, first_page, last_page))
            .advance_to(completed_through);
        self.failed_pages.extend(failed.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_page_follows_last_completed() {
        let mut cp = BatchCheckpoint::new(0, 1, 10);
        assert_eq!(cp.resume_page(), Some(1));

        cp.advance_to(4);
        assert_eq!(cp.resume_page(), Some(5));

        cp.advance_to(2);
        assert_eq!(cp.last_completed_page, Some(4));

        cp.advance_to(10);
        assert!(cp.is_complete());
    }

    #[test]
    fn chunk_ending_at_last_page_number_completes() {
        let mut cp = BatchCheckpoint::new(0, u32::MAX - 1, u32::MAX);
        cp.advance_to(u32::MAX - 1);
        assert_eq!(cp.resume_page(), Some(u32::MAX));

        cp.advance_to(u32::MAX);
        assert_eq!(cp.resume_page(), None);
        assert!(cp.is_complete());
    }

    #[test]
    fn ledger_records_flushes_and_failures() {
        let mut ledger = CheckpointLedger::new("abc");
        ledger.record_flush(1, 11, 20, 15, &[13]);
        ledger.record_flush(1, 11, 20, 20, &[]);

        assert!(ledger.matches_plan("abc"));
        assert!(!ledger.matches_plan("def"));
        assert!(ledger.checkpoint(1).unwrap().is_complete());
        assert!(ledger.failed_pages.contains(&13));
        assert!(ledger.checkpoint(0).is_none());
    }
}
