//! In-memory ledger backend

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use super::{
    apply_update, validate_key, ActivityLedger, ActivityMatch, ActivityRecord, ActivityStatus,
    DispatchOutcome, LedgerResult,
};

/// Ledger held in process memory, keyed by workspace
#[derive(Default)]
pub struct MemoryLedger {
    workspaces: RwLock<HashMap<String, Vec<ActivityRecord>>>,
    changes: Arc<Notify>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record of a workspace, across modules
    pub async fn workspace_records(&self, workspace: &str) -> Vec<ActivityRecord> {
        self.workspaces
            .read()
            .await
            .get(workspace)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActivityLedger for MemoryLedger {
    async fn record_dispatch(&self, record: ActivityRecord) -> LedgerResult<DispatchOutcome> {
        validate_key(&record.workspace, &record.module)?;

        let mut workspaces = self.workspaces.write().await;
        let records = workspaces.entry(record.workspace.clone()).or_default();
        if records.iter().any(|r| r.id == record.id) {
            return Ok(DispatchOutcome::Duplicate(record.id));
        }

        let id = record.id.clone();
        debug!("Recorded activity {} for {}/{}", id, record.workspace, record.module);
        records.push(record);
        drop(workspaces);

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

        let mut workspaces = self.workspaces.write().await;
        let moved = match workspaces.get_mut(workspace) {
            Some(records) => apply_update(records, workspace, module, matcher, status)?,
            None => 0,
        };
        drop(workspaces);

        if moved > 0 {
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

        Ok(self
            .workspaces
            .read()
            .await
            .get(workspace)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.module == module)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, workspace: &str, module: &str) -> LedgerResult<usize> {
        validate_key(workspace, module)?;

        let mut workspaces = self.workspaces.write().await;
        let removed = match workspaces.get_mut(workspace) {
            Some(records) => {
                let before = records.len();
                records.retain(|r| r.module != module);
                before - records.len()
            }
            None => 0,
        };
        drop(workspaces);

        if removed > 0 {
            self.changes.notify_waiters();
        }
        Ok(removed)
    }

    fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changes)
    }
}
