//! JSON history store: merging, snapshots and checkpoints on disk

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio_test::assert_ok;

use sk_market_scout::domain::{CheckpointLedger, HistoryRecord};
use sk_market_scout::infrastructure::config::sk_ah;
use sk_market_scout::infrastructure::history_store::{BatchFlush, BatchSink, HistoryStore};

fn sale(name: &str, price: i64, hour: u32) -> HistoryRecord {
    let ts = NaiveDate::from_ymd_opt(2025, 1, 15)
        .unwrap()
        .and_hms_opt(hour, 4, 5)
        .unwrap();
    HistoryRecord::new(name, Decimal::from(price), ts)
}

fn snapshot_count(dir: &std::path::Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("history_snapshot_"))
        .count()
}

#[tokio::test]
async fn missing_store_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path().join("not-created-yet"));
    assert!(assert_ok!(store.load().await).is_empty());
    assert!(assert_ok!(store.load_checkpoints().await).is_none());
}

#[tokio::test]
async fn merging_the_same_batch_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());
    let batch = vec![
        sale("Heavy Alchemer Piercer", 4000, 1),
        sale("Heavy Alchemer Piercer", 4500, 2),
        sale("Sun Shards", 10, 2),
    ];

    let first = store.merge_and_save(&batch, "w0_p1-2").await.unwrap();
    assert_eq!(first.appended, 3);
    assert_eq!(first.total_entries, 3);
    let written = std::fs::read_to_string(store.store_path()).unwrap();

    let second = store.merge_and_save(&batch, "w0_p1-2").await.unwrap();
    assert_eq!(second.appended, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(second.total_entries, 3);
    assert_eq!(std::fs::read_to_string(store.store_path()).unwrap(), written);

    let history = store.load().await.unwrap();
    assert_eq!(history["Heavy Alchemer Piercer"].len(), 2);
}

#[tokio::test]
async fn store_file_is_json_keyed_by_item() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());
    store
        .merge_and_save(&[sale("Sun Shards", 10, 15)], "w0_p1-1")
        .await
        .unwrap();

    assert_eq!(store.store_path(), dir.path().join(sk_ah::STORE_FILE));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.store_path()).unwrap()).unwrap();
    assert_eq!(json["Sun Shards"][0]["price"], serde_json::json!(10.0));
    assert_eq!(json["Sun Shards"][0]["timestamp"], "2025-01-15T15:04:05");

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn empty_batch_writes_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());

    let outcome = store.merge_and_save(&[], "w0_p1-1").await.unwrap();
    assert!(outcome.snapshot_path.is_none());
    assert_eq!(snapshot_count(dir.path()), 0);
    assert!(store.store_path().exists());

    let outcome = store
        .merge_and_save(&[sale("Sun Shards", 10, 1)], "w0_p2-2")
        .await
        .unwrap();
    let snapshot = outcome.snapshot_path.unwrap();
    assert!(snapshot.file_name().unwrap().to_string_lossy().starts_with("history_snapshot_w0_p2-2_"));
    assert_eq!(snapshot_count(dir.path()), 1);
}

#[tokio::test]
async fn flush_advances_checkpoint_and_records_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());

    let flush = BatchFlush {
        plan_fingerprint: "plan-a".to_string(),
        worker_id: 2,
        first_page: 41,
        last_page: 60,
        completed_through: 50,
        failed_pages: vec![47],
        records: vec![sale("Sun Shards", 10, 3)],
    };
    store.flush_batch(&flush, &flush.label(41)).await.unwrap();

    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert!(ledger.matches_plan("plan-a"));
    let checkpoint = ledger.checkpoint(2).unwrap();
    assert_eq!(checkpoint.last_completed_page, Some(50));
    assert_eq!(checkpoint.resume_page(), Some(51));
    assert!(ledger.failed_pages.contains(&47));

    // A later flush from a different plan replaces the ledger
    let other = BatchFlush {
        plan_fingerprint: "plan-b".to_string(),
        completed_through: 42,
        failed_pages: vec![],
        records: vec![],
        ..flush
    };
    store.flush_batch(&other, "w2_p41-42").await.unwrap();
    let ledger = store.load_checkpoints().await.unwrap().unwrap();
    assert!(ledger.matches_plan("plan-b"));
    assert!(ledger.failed_pages.is_empty());
    assert_eq!(ledger.checkpoint(2).unwrap().last_completed_page, Some(42));
}

#[tokio::test]
async fn checkpoints_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::new(dir.path());

    let mut ledger = CheckpointLedger::new("plan-a");
    ledger.record_flush(0, 1, 1478, 120, &[7, 9]);
    ledger.record_flush(1, 1479, 2956, 1500, &[]);
    store.save_checkpoints(&ledger).await.unwrap();

    assert!(dir.path().join(sk_ah::CHECKPOINT_FILE).exists());
    assert_eq!(store.load_checkpoints().await.unwrap(), Some(ledger));
}
