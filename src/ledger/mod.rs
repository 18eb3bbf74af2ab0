//! Activity Ledger: durable per-command lifecycle state.
//!
//! Records are keyed by (workspace, module, checksum). A record is inserted as
//! `Running` and moves exactly once to `Done` or `Error`. Updates are applied
//! under the backend's write lane, so concurrent completions within a chunk
//! never lose each other's transitions.

pub mod error;
pub mod file;
pub mod memory;
pub mod types;

pub use error::{LedgerError, LedgerResult};
pub use file::FileLedger;
pub use memory::MemoryLedger;
pub use types::{
    count_running, module_complete, ActivityMatch, ActivityRecord, ActivityStatus,
    DispatchOutcome,
};

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Notify;

#[async_trait]
pub trait ActivityLedger: Send + Sync {
    /// Insert a `Running` record unless one with the same checksum exists
    async fn record_dispatch(&self, record: ActivityRecord) -> LedgerResult<DispatchOutcome>;

    /// Move matching `Running` records to a terminal `status`; returns how many moved
    async fn update_status(
        &self,
        workspace: &str,
        module: &str,
        matcher: &ActivityMatch,
        status: ActivityStatus,
    ) -> LedgerResult<usize>;

    async fn query_status(&self, workspace: &str, module: &str)
        -> LedgerResult<Vec<ActivityRecord>>;

    /// Delete every record of (workspace, module); returns how many were removed
    async fn clear(&self, workspace: &str, module: &str) -> LedgerResult<usize>;

    /// Fired after every change to the ledger
    fn changes(&self) -> Arc<Notify>;

    /// Forced-continue escape hatch: every `Running` record becomes `Done`
    async fn force_complete(&self, workspace: &str, module: &str) -> LedgerResult<usize> {
        self.update_status(workspace, module, &ActivityMatch::All, ActivityStatus::Done)
            .await
    }
}

pub(crate) fn validate_key(workspace: &str, module: &str) -> LedgerResult<()> {
    for (what, value) in [("workspace", workspace), ("module", module)] {
        if value.is_empty() || value.contains('/') || value.contains('\\') || value.contains("..")
        {
            return Err(LedgerError::InvalidKey(format!("{} '{}'", what, value)));
        }
    }
    Ok(())
}

/// Compare-and-set over a record slice: only `Running` records move
pub(crate) fn apply_update(
    records: &mut [ActivityRecord],
    workspace: &str,
    module: &str,
    matcher: &ActivityMatch,
    status: ActivityStatus,
) -> LedgerResult<usize> {
    if !status.is_terminal() {
        return Err(LedgerError::InvalidTransition(status));
    }

    let now = Utc::now();
    let mut moved = 0;
    for record in records.iter_mut().filter(|r| {
        r.belongs_to(workspace, module) && r.status == ActivityStatus::Running && matcher.matches(r)
    }) {
        record.status = status;
        record.updated_at = now;
        moved += 1;
    }
    Ok(moved)
}

#[cfg(test)]
mod tests;
