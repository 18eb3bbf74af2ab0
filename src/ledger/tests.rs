use super::*;
use crate::command::ResolvedCommand;
use std::sync::Arc;
use tempfile::TempDir;

fn record(cmd: &str, module: &str) -> ActivityRecord {
    ActivityRecord::from_command(&ResolvedCommand::single(cmd, module), "example.com")
}

async fn check_duplicate_suppression(ledger: &dyn ActivityLedger) {
    let first = ledger.record_dispatch(record("echo hi", "probe")).await.unwrap();
    let second = ledger.record_dispatch(record("echo hi", "probe")).await.unwrap();

    assert!(matches!(first, DispatchOutcome::Recorded(_)));
    assert!(second.is_duplicate());
    assert_eq!(first.id(), second.id());
    assert_eq!(ledger.query_status("example.com", "probe").await.unwrap().len(), 1);
}

async fn check_transitions_once(ledger: &dyn ActivityLedger) {
    let outcome = ledger.record_dispatch(record("exit 1", "scan")).await.unwrap();
    let by_id = ActivityMatch::Id(outcome.id().to_string());

    let moved = ledger
        .update_status("example.com", "scan", &by_id, ActivityStatus::Error)
        .await
        .unwrap();
    assert_eq!(moved, 1);

    // Terminal records never move again
    let moved = ledger
        .update_status("example.com", "scan", &by_id, ActivityStatus::Done)
        .await
        .unwrap();
    assert_eq!(moved, 0);

    let records = ledger.query_status("example.com", "scan").await.unwrap();
    assert_eq!(records[0].status, ActivityStatus::Error);

    let err = ledger
        .update_status("example.com", "scan", &ActivityMatch::All, ActivityStatus::Running)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidTransition(ActivityStatus::Running)));
}

async fn check_module_isolation_and_clear(ledger: &dyn ActivityLedger) {
    ledger.record_dispatch(record("a", "one")).await.unwrap();
    ledger.record_dispatch(record("b", "one")).await.unwrap();
    ledger.record_dispatch(record("c", "two")).await.unwrap();

    let forced = ledger.force_complete("example.com", "one").await.unwrap();
    assert_eq!(forced, 2);
    let two = ledger.query_status("example.com", "two").await.unwrap();
    assert_eq!(two[0].status, ActivityStatus::Running);

    assert_eq!(ledger.clear("example.com", "one").await.unwrap(), 2);
    assert!(ledger.query_status("example.com", "one").await.unwrap().is_empty());
    assert_eq!(ledger.query_status("example.com", "two").await.unwrap().len(), 1);

    // Cleared records can be dispatched again
    let again = ledger.record_dispatch(record("a", "one")).await.unwrap();
    assert!(!again.is_duplicate());
}

async fn check_concurrent_updates(ledger: Arc<dyn ActivityLedger>) {
    let mut ids = Vec::new();
    for i in 0..20 {
        let outcome = ledger
            .record_dispatch(record(&format!("echo {i}"), "burst"))
            .await
            .unwrap();
        ids.push(outcome.id().to_string());
    }

    let updates = ids.into_iter().enumerate().map(|(i, id)| {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move {
            let status = if i % 2 == 0 {
                ActivityStatus::Done
            } else {
                ActivityStatus::Error
            };
            ledger
                .update_status("example.com", "burst", &ActivityMatch::Id(id), status)
                .await
                .unwrap()
        })
    });
    let moved: usize = futures::future::join_all(updates)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .sum();

    assert_eq!(moved, 20);
    let records = ledger.query_status("example.com", "burst").await.unwrap();
    assert_eq!(records.len(), 20);
    assert!(module_complete(&records));
    assert_eq!(
        records.iter().filter(|r| r.status == ActivityStatus::Done).count(),
        10
    );
}

#[tokio::test]
async fn test_memory_ledger_contract() {
    check_duplicate_suppression(&MemoryLedger::new()).await;
    check_transitions_once(&MemoryLedger::new()).await;
    check_module_isolation_and_clear(&MemoryLedger::new()).await;
    check_concurrent_updates(Arc::new(MemoryLedger::new())).await;
}

#[tokio::test]
async fn test_file_ledger_contract() {
    let temp = TempDir::new().unwrap();
    check_duplicate_suppression(&FileLedger::new(temp.path().join("a"))).await;
    check_transitions_once(&FileLedger::new(temp.path().join("b"))).await;
    check_module_isolation_and_clear(&FileLedger::new(temp.path().join("c"))).await;
    check_concurrent_updates(Arc::new(FileLedger::new(temp.path().join("d")))).await;
}

#[tokio::test]
async fn test_file_ledger_persists_across_instances() {
    let temp = TempDir::new().unwrap();
    let outcome = FileLedger::new(temp.path())
        .record_dispatch(record("echo hi", "probe"))
        .await
        .unwrap();

    let reopened = FileLedger::new(temp.path());
    let records = reopened.query_status("example.com", "probe").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, outcome.id());
    assert!(reopened
        .record_dispatch(record("echo hi", "probe"))
        .await
        .unwrap()
        .is_duplicate());
}

#[tokio::test]
async fn test_file_ledgers_sharing_a_root_lose_no_updates() {
    let temp = TempDir::new().unwrap();
    let first: Arc<dyn ActivityLedger> = Arc::new(FileLedger::new(temp.path()));
    let second: Arc<dyn ActivityLedger> = Arc::new(FileLedger::new(temp.path()));

    let mut ids = Vec::new();
    for i in 0..40 {
        let outcome = first
            .record_dispatch(record(&format!("echo {i}"), "shared"))
            .await
            .unwrap();
        ids.push(outcome.id().to_string());
    }

    let updates = ids.into_iter().enumerate().map(|(i, id)| {
        let ledger = if i % 2 == 0 {
            Arc::clone(&first)
        } else {
            Arc::clone(&second)
        };
        tokio::spawn(async move {
            ledger
                .update_status(
                    "example.com",
                    "shared",
                    &ActivityMatch::Id(id),
                    ActivityStatus::Done,
                )
                .await
        })
    });
    for result in futures::future::join_all(updates).await {
        assert_eq!(result.unwrap().unwrap(), 1);
    }

    let records = second.query_status("example.com", "shared").await.unwrap();
    assert_eq!(records.len(), 40);
    assert_eq!(count_running(&records), 0);
    assert!(!temp.path().join("example.com/activities.lock").exists());
}

#[tokio::test]
async fn test_file_ledger_times_out_on_held_lock() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("example.com");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("activities.lock"), "4242").unwrap();

    let ledger = FileLedger::new(temp.path()).with_lock_wait(std::time::Duration::from_millis(50));
    let err = ledger.record_dispatch(record("echo hi", "probe")).await.unwrap_err();
    assert!(matches!(err, LedgerError::LockTimeout { .. }));
    assert!(err.is_unavailable());

    // The foreign lock is left alone
    assert!(dir.join("activities.lock").exists());
}

#[tokio::test]
async fn test_file_ledger_breaks_stale_lock() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("example.com");
    std::fs::create_dir_all(&dir).unwrap();
    let lock = std::fs::File::create(dir.join("activities.lock")).unwrap();
    lock.set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(120))
        .unwrap();
    drop(lock);

    let ledger = FileLedger::new(temp.path()).with_lock_wait(std::time::Duration::from_millis(50));
    let outcome = ledger.record_dispatch(record("echo hi", "probe")).await.unwrap();
    assert!(!outcome.is_duplicate());
    assert!(!dir.join("activities.lock").exists());
}

#[tokio::test]
async fn test_file_ledger_missing_document_is_empty() {
    let temp = TempDir::new().unwrap();
    let ledger = FileLedger::new(temp.path());
    assert!(ledger.query_status("nobody", "probe").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_ledger_corrupt_document_is_unavailable() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("example.com");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("activities.json"), "{oops").unwrap();

    let err = FileLedger::new(temp.path())
        .query_status("example.com", "probe")
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
    let recon: crate::error::ReconError = err.into();
    assert_eq!(recon.code(), crate::error::ErrorCode::STORAGE_CORRUPTED);
}

#[tokio::test]
async fn test_invalid_keys_rejected() {
    let ledger = MemoryLedger::new();
    let err = ledger.query_status("../etc", "probe").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidKey(_)));
}

#[tokio::test]
async fn test_changes_notified_on_update() {
    let ledger = Arc::new(MemoryLedger::new());
    let outcome = ledger.record_dispatch(record("x", "m")).await.unwrap();

    let notify = ledger.changes();
    let notified = notify.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();

    ledger
        .update_status(
            "example.com",
            "m",
            &ActivityMatch::Id(outcome.id().to_string()),
            ActivityStatus::Done,
        )
        .await
        .unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(1), notified)
        .await
        .expect("change notification");
}
