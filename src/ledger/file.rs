//! JSON-document ledger backend, one document per workspace.
//!
//! Every mutation holds an exclusive lock file for its workspace, so separate
//! processes sharing one ledger root never interleave read-modify-write
//! cycles. Documents are replaced with a temp-file rename and readers never
//! observe a half-written file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::{
    apply_update, validate_key, ActivityLedger, ActivityMatch, ActivityRecord, ActivityStatus,
    DispatchOutcome, LedgerError, LedgerResult,
};
use crate::workspace::write_atomic;

const LEDGER_FILE: &str = "activities.json";
const LOCK_FILE: &str = "activities.lock";
const LOCK_RETRY: Duration = Duration::from_millis(10);
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);
/// A lock file older than this was left behind by a crashed writer
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    activities: Vec<ActivityRecord>,
}

/// Exclusive lock on one workspace document, released on drop
struct WorkspaceLock {
    path: PathBuf,
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to release ledger lock {}: {}", self.path.display(), e);
        }
    }
}

pub struct FileLedger {
    root: PathBuf,
    write_lane: Mutex<()>,
    lock_wait: Duration,
    changes: Arc<Notify>,
}

impl FileLedger {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lane: Mutex::new(()),
            lock_wait: DEFAULT_LOCK_WAIT,
            changes: Arc::new(Notify::new()),
        }
    }

    /// How long a mutation waits for another writer's lock before failing
    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, workspace: &str) -> PathBuf {
        self.root.join(workspace).join(LEDGER_FILE)
    }

    fn lock_path(&self, workspace: &str) -> PathBuf {
        self.root.join(workspace).join(LOCK_FILE)
    }

    /// Take the workspace lock file, waiting out other writers
    async fn acquire_lock(&self, workspace: &str) -> LedgerResult<WorkspaceLock> {
        let path = self.lock_path(workspace);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io(parent, e))?;
        }

        let deadline = Instant::now() + self.lock_wait;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let lock = WorkspaceLock { path };
                    let holder = std::process::id().to_string();
                    file.write_all(holder.as_bytes())
                        .await
                        .map_err(|e| LedgerError::io(&lock.path, e))?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::lock_is_stale(&path).await {
                        warn!("Removing stale ledger lock {}", path.display());
                        if let Err(e) = fs::remove_file(&path).await {
                            debug!("Stale lock already gone: {}", e);
                        }
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(LedgerError::LockTimeout { path });
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Err(e) => return Err(LedgerError::io(path, e)),
            }
        }
    }

    async fn lock_is_stale(path: &Path) -> bool {
        match fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified
                .elapsed()
                .map(|age| age > LOCK_STALE_AFTER)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Missing document reads as empty
    async fn read_document(&self, workspace: &str) -> LedgerResult<LedgerDocument> {
        let path = self.document_path(workspace);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LedgerDocument::default())
            }
            Err(e) => return Err(LedgerError::io(path, e)),
        };
        serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt { path, source })
    }

    async fn write_document(&self, workspace: &str, document: &LedgerDocument) -> LedgerResult<()> {
        let path = self.document_path(workspace);
        let content = serde_json::to_vec_pretty(document)?;
        write_atomic(&path, &content)
            .await
            .map_err(|e| LedgerError::io(path, e))
    }
}

#[async_trait]
impl ActivityLedger for FileLedger {
    async fn record_dispatch(&self, record: ActivityRecord) -> LedgerResult<DispatchOutcome> {
        validate_key(&record.workspace, &record.module)?;
        let _lane = self.write_lane.lock().await;
        let _lock = self.acquire_lock(&record.workspace).await?;

        let mut document = self.read_document(&record.workspace).await?;
        if document.activities.iter().any(|r| r.id == record.id) {
            return Ok(DispatchOutcome::Duplicate(record.id));
        }

        let id = record.id.clone();
        let workspace = record.workspace.clone();
        document.activities.push(record);
        self.write_document(&workspace, &document).await?;
        debug!("Recorded activity {} in {}", id, self.document_path(&workspace).display());

        self.changes.notify_waiters();
        Ok(DispatchOutcome::Recorded(id))
    }

    async fn update_status(
        &self,
        workspace: &str,
        module: &str,
        matcher: &ActivityMatch,
        status: ActivityStatus,
    ) -> LedgerResult<usize> {
        validate_key(workspace, module)?;
        let _lane = self.write_lane.lock().await;
        let _lock = self.acquire_lock(workspace).await?;

        let mut document = self.read_document(workspace).await?;
        let moved = apply_update(&mut document.activities, workspace, module, matcher, status)?;
        if moved > 0 {
            self.write_document(workspace, &document).await?;
            self.changes.notify_waiters();
        }
        Ok(moved)
    }

    async fn query_status(
        &self,
        workspace: &str,
        module: &str,
    ) -> LedgerResult<Vec<ActivityRecord>> {
        validate_key(workspace, module)?;

        let document = self.read_document(workspace).await?;
        Ok(document
            .activities
            .into_iter()
            .filter(|r| r.module == module)
            .collect())
    }

    async fn clear(&self, workspace: &str, module: &str) -> LedgerResult<usize> {
        validate_key(workspace, module)?;
        let _lane = self.write_lane.lock().await;
        let _lock = self.acquire_lock(workspace).await?;

        let mut document = self.read_document(workspace).await?;
        let before = document.activities.len();
        document.activities.retain(|r| r.module != module);
        let removed = before - document.activities.len();
        if removed > 0 {
            self.write_document(workspace, &document).await?;
            self.changes.notify_waiters();
        }
        Ok(removed)
    }

    fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changes)
    }
}
