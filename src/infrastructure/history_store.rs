//! Durable history store
//!
//! Layout of the data directory:
//! - `item_database.json`: item name -> list of sales (the [`ItemHistory`])
//! - `crawl_checkpoints.json`: the [`CheckpointLedger`] of the current crawl plan
//! - `history_snapshot_{label}_{YYYYmmdd_HHMMSS}.csv`: records of one flush
//!
//! JSON files are replaced atomically (temp file, fsync, rename). Every
//! mutating operation runs under one async mutex so concurrent workers never
//! interleave read-merge-write cycles.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::config::sk_ah;
use crate::domain::checkpoint::CheckpointLedger;
use crate::domain::history::{HistoryRecord, ItemHistory, merge_records, total_entries};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write CSV {path:?}: {message}")]
    Csv { path: PathBuf, message: String },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of one merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub appended: usize,
    pub duplicates: usize,
    /// Absent when the batch was empty
    pub snapshot_path: Option<PathBuf>,
    pub total_entries: usize,
}

/// One worker's accumulated pages, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFlush {
    pub plan_fingerprint: String,
    pub worker_id: usize,
    /// The worker's chunk
    pub first_page: u32,
    pub last_page: u32,
    /// Last page covered by this flush (fetched or skipped)
    pub completed_through: u32,
    pub failed_pages: Vec<u32>,
    pub records: Vec<HistoryRecord>,
}

impl BatchFlush {
    /// Snapshot label: worker and the page span this batch covers
    pub fn label(&self, batch_first_page: u32) -> String {
        format!("w{}_p{}-{}", self.worker_id, batch_first_page, self.completed_through)
    }
}

/// Destination for crawl batches and source of checkpoints
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn load_checkpoints(&self) -> StoreResult<Option<CheckpointLedger>>;

    async fn save_checkpoints(&self, ledger: &CheckpointLedger) -> StoreResult<()>;

    /// Merge the batch and advance the worker's checkpoint, in one critical section
    async fn flush_batch(&self, flush: &BatchFlush, label: &str) -> StoreResult<MergeOutcome>;
}

#[derive(Serialize)]
struct SnapshotRow<'a> {
    item_name: &'a str,
    price: Decimal,
    timestamp: NaiveDateTime,
}

pub struct HistoryStore {
    data_dir: PathBuf,
    store_path: PathBuf,
    checkpoint_path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            store_path: data_dir.join(sk_ah::STORE_FILE),
            checkpoint_path: data_dir.join(sk_ah::CHECKPOINT_FILE),
            data_dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Current history; empty if the store file does not exist yet
    pub async fn load(&self) -> StoreResult<ItemHistory> {
        Ok(read_json(&self.store_path).await?.unwrap_or_default())
    }

    /// Deduplicate `records` against the store and each other, append the rest,
    /// rewrite the store, and write a CSV snapshot of `records`.
    pub async fn merge_and_save(&self, records: &[HistoryRecord], label: &str) -> StoreResult<MergeOutcome> {
        let _guard = self.write_lock.lock().await;
        self.merge_locked(records, label).await
    }

    async fn merge_locked(&self, records: &[HistoryRecord], label: &str) -> StoreResult<MergeOutcome> {
        self.ensure_data_dir().await?;

        let mut history = self.load().await?;
        let counts = merge_records(&mut history, records);

        if counts.appended > 0 || !fs::try_exists(&self.store_path).await.unwrap_or(false) {
            write_json_atomic(&self.store_path, &history, "item history").await?;
        }

        let snapshot_path = if records.is_empty() {
            None
        } else {
            Some(self.write_snapshot(records, label).await?)
        };

        let outcome = MergeOutcome {
            appended: counts.appended,
            duplicates: counts.duplicates,
            snapshot_path,
            total_entries: total_entries(&history),
        };
        info!(
            "💾 Merged batch {}: {} appended, {} duplicates, {} entries stored",
            label, outcome.appended, outcome.duplicates, outcome.total_entries
        );
        Ok(outcome)
    }

    async fn write_snapshot(&self, records: &[HistoryRecord], label: &str) -> StoreResult<PathBuf> {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .data_dir
            .join(format!("history_snapshot_{label}_{timestamp}.csv"));

        let csv_error = |message: String| StoreError::Csv {
            path: path.clone(),
            message,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in records {
            writer
                .serialize(SnapshotRow {
                    item_name: &record.item_name,
                    price: record.price,
                    timestamp: record.timestamp,
                })
                .map_err(|e| csv_error(e.to_string()))?;
        }
        let bytes = writer.into_inner().map_err(|e| csv_error(e.to_string()))?;

        fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        debug!("History snapshot saved to {:?}", path);
        Ok(path)
    }

    async fn ensure_data_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::io(&self.data_dir, e))
    }

    async fn load_checkpoints_unlocked(&self) -> StoreResult<Option<CheckpointLedger>> {
        read_json(&self.checkpoint_path).await
    }

    async fn save_checkpoints_unlocked(&self, ledger: &CheckpointLedger) -> StoreResult<()> {
        self.ensure_data_dir().await?;
        write_json_atomic(&self.checkpoint_path, ledger, "checkpoint ledger").await
    }
}

#[async_trait]
impl BatchSink for HistoryStore {
    async fn load_checkpoints(&self) -> StoreResult<Option<CheckpointLedger>> {
        let _guard = self.write_lock.lock().await;
        self.load_checkpoints_unlocked().await
    }

    async fn save_checkpoints(&self, ledger: &CheckpointLedger) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.save_checkpoints_unlocked(ledger).await
    }

    async fn flush_batch(&self, flush: &BatchFlush, label: &str) -> StoreResult<MergeOutcome> {
        let _guard = self.write_lock.lock().await;

        let outcome = self.merge_locked(&flush.records, label).await?;

        let mut ledger = match self.load_checkpoints_unlocked().await? {
            Some(ledger) if ledger.matches_plan(&flush.plan_fingerprint) => ledger,
            Some(_) => {
                warn!("Checkpoint ledger belongs to another crawl plan; replacing it");
                CheckpointLedger::new(flush.plan_fingerprint.clone())
            }
            None => CheckpointLedger::new(flush.plan_fingerprint.clone()),
        };
        ledger.record_flush(
            flush.worker_id,
            flush.first_page,
            flush.last_page,
            flush.completed_through,
            &flush.failed_pages,
        );
        self.save_checkpoints_unlocked(&ledger).await?;

        debug!(
            "Worker {} checkpoint advanced to page {}",
            flush.worker_id, flush.completed_through
        );
        Ok(outcome)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{:?} does not exist yet", path);
            return Ok(None);
        }
        Err(e) => return Err(StoreError::io(path, e)),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `value` as pretty JSON next to `path`, fsync, then rename over `path`
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T, what: &'static str) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize { what, source })?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
