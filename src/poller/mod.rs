//! Poller / Synchronizer: blocks a workflow stage until its module is done.
//!
//! A module is done when none of its activities is `Running`. Read failures
//! count as "not done". With a retry budget, the poller gives up after that
//! many polls, forces the remaining activities terminal and returns
//! [`WaitOutcome::ForcedContinue`]. Without one it waits indefinitely.

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ledger::{count_running, module_complete, ActivityLedger, ActivityRecord};

/// Anything the poller can observe: a local ledger or a remote executor
#[async_trait]
pub trait ActivitySource: Send + Sync {
    async fn snapshot(&self, workspace: &str, module: &str) -> Result<Vec<ActivityRecord>>;

    /// Force every `Running` activity of the module terminal
    async fn force_remaining(&self, workspace: &str, module: &str) -> Result<usize>;

    /// Drop the module's activities before a fresh run
    async fn reset_module(&self, workspace: &str, module: &str) -> Result<usize>;

    /// Wake-up signal for in-process sources
    fn change_signal(&self) -> Option<Arc<Notify>> {
        None
    }
}

#[async_trait]
impl<T: ActivityLedger + ?Sized> ActivitySource for T {
    async fn snapshot(&self, workspace: &str, module: &str) -> Result<Vec<ActivityRecord>> {
        Ok(self.query_status(workspace, module).await?)
    }

    async fn force_remaining(&self, workspace: &str, module: &str) -> Result<usize> {
        Ok(self.force_complete(workspace, module).await?)
    }

    async fn reset_module(&self, workspace: &str, module: &str) -> Result<usize> {
        Ok(self.clear(workspace, module).await?)
    }

    fn change_signal(&self) -> Option<Arc<Notify>> {
        Some(self.changes())
    }
}

/// A shared ledger handle as a poller source
#[derive(Clone)]
pub struct SharedLedger(pub Arc<dyn ActivityLedger>);

#[async_trait]
impl ActivitySource for SharedLedger {
    async fn snapshot(&self, workspace: &str, module: &str) -> Result<Vec<ActivityRecord>> {
        self.0.as_ref().snapshot(workspace, module).await
    }

    async fn force_remaining(&self, workspace: &str, module: &str) -> Result<usize> {
        self.0.as_ref().force_remaining(workspace, module).await
    }

    async fn reset_module(&self, workspace: &str, module: &str) -> Result<usize> {
        self.0.as_ref().reset_module(workspace, module).await
    }

    fn change_signal(&self) -> Option<Arc<Notify>> {
        Some(self.0.changes())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Interval between polls
    pub delay: Duration,
    /// Polls before forcing completion; 0 waits forever
    pub max_retries: u32,
    /// Print the waiting message once every this many polls
    pub log_every: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(20),
            max_retries: 0,
            log_every: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed { polls: u32 },
    ForcedContinue { polls: u32, forced: usize },
}

impl WaitOutcome {
    pub fn was_forced(&self) -> bool {
        matches!(self, WaitOutcome::ForcedContinue { .. })
    }
}

/// Wait until no activity of (workspace, module) is `Running`
pub async fn wait_for_module(
    source: &dyn ActivitySource,
    workspace: &str,
    module: &str,
    policy: &PollPolicy,
) -> WaitOutcome {
    let signal = source.change_signal();
    let mut polls: u32 = 0;

    loop {
        // Armed before the snapshot so a change in between still wakes us
        let mut notified = signal.as_ref().map(|notify| Box::pin(notify.notified()));
        if let Some(n) = notified.as_mut() {
            n.as_mut().enable();
        }

        polls += 1;
        match source.snapshot(workspace, module).await {
            Ok(records) if module_complete(&records) => {
                if records.is_empty() {
                    debug!("Module {} has no activities in {}", module, workspace);
                }
                debug!("Module {} complete after {} polls", module, polls);
                return WaitOutcome::Completed { polls };
            }
            Ok(records) => {
                if should_log(polls, policy.log_every) {
                    info!(
                        "Waiting for module {} in {}: {} of {} activities running",
                        module,
                        workspace,
                        count_running(&records),
                        records.len()
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Cannot read activities for {}/{}, treating as not done: {}",
                    workspace, module, e
                );
            }
        }

        if policy.max_retries > 0 && polls >= policy.max_retries {
            let forced = match source.force_remaining(workspace, module).await {
                Ok(forced) => forced,
                Err(e) => {
                    warn!("Could not force activities of {}: {}", module, e);
                    0
                }
            };
            warn!(
                "Module {} force-continued after {} polls, {} activities were still running",
                module, polls, forced
            );
            return WaitOutcome::ForcedContinue { polls, forced };
        }

        sleep_or_signal(notified, policy.delay).await;
    }
}

fn should_log(polls: u32, log_every: u32) -> bool {
    log_every <= 1 || (polls - 1) % log_every == 0
}

async fn sleep_or_signal(
    notified: Option<Pin<Box<tokio::sync::futures::Notified<'_>>>>,
    delay: Duration,
) {
    match notified {
        Some(notified) => {
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
        None => tokio::time::sleep(delay).await,
    }
}
