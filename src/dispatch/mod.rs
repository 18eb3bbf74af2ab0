//! Dispatch: record an activity, run it, settle its status.
//!
//! [`CommandDispatch`] is the seam between the workflow runner and whatever
//! executes commands: [`LocalDispatcher`] runs them in this process, and the
//! HTTP client forwards them to a remote executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::command::{CmdType, ResolvedCommand};
use crate::error::Result;
use crate::executor::{has_content, CommandExecutor, CommandOutcome};
use crate::ledger::{ActivityLedger, ActivityMatch, ActivityRecord, ActivityStatus, DispatchOutcome};

/// Body of the execute endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub cmd: String,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub std_path: String,
    pub module: String,
    pub workspace: String,
    #[serde(default)]
    pub cmd_type: CmdType,
    #[serde(default)]
    pub resources: Option<String>,
    #[serde(default)]
    pub chunk: Option<usize>,
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub forced: bool,
    /// Do not echo process output
    #[serde(default)]
    pub nolog: bool,
    #[serde(default)]
    pub speed: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl ExecuteRequest {
    pub fn from_command(command: &ResolvedCommand, workspace: &str) -> Self {
        Self {
            cmd: command.cmd.clone(),
            output_path: command.output_path.clone(),
            std_path: command.std_path.clone(),
            module: command.module.clone(),
            workspace: workspace.to_string(),
            cmd_type: command.cmd_type,
            resources: command.resources.clone(),
            chunk: command.chunk,
            delay: command.delay,
            forced: command.forced,
            nolog: false,
            speed: command.speed.clone(),
            timeout: command.timeout,
        }
    }

    pub fn quiet(mut self, nolog: bool) -> Self {
        self.nolog = nolog;
        self
    }

    pub fn to_command(&self) -> ResolvedCommand {
        ResolvedCommand {
            cmd_type: self.cmd_type,
            resources: self.resources.clone(),
            chunk: self.chunk,
            delay: self.delay,
            timeout: self.timeout,
            speed: self.speed.clone(),
            ..ResolvedCommand::single(self.cmd.clone(), self.module.clone())
                .with_output_path(self.output_path.clone())
                .with_std_path(self.std_path.clone())
                .forced(self.forced)
        }
    }

    pub fn to_record(&self) -> ActivityRecord {
        ActivityRecord::from_command(&self.to_command(), &self.workspace)
    }
}

/// Answer to a submit: the activity id and whether it was already known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: String,
    pub duplicate: bool,
}

/// Answer to an inline execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReport {
    pub id: String,
    pub duplicate: bool,
    /// Terminal status, `None` for a duplicate that was not run
    pub status: Option<ActivityStatus>,
}

#[async_trait]
pub trait CommandDispatch: Send + Sync {
    /// Record the activity and start it; returns once it is recorded
    async fn submit(&self, request: ExecuteRequest) -> Result<SubmitReceipt>;
}

#[derive(Clone)]
pub struct LocalDispatcher {
    executor: CommandExecutor,
    ledger: Arc<dyn ActivityLedger>,
}

impl LocalDispatcher {
    pub fn new(executor: CommandExecutor, ledger: Arc<dyn ActivityLedger>) -> Self {
        Self { executor, ledger }
    }

    pub fn ledger(&self) -> Arc<dyn ActivityLedger> {
        Arc::clone(&self.ledger)
    }

    async fn record(&self, request: &ExecuteRequest) -> Result<DispatchOutcome> {
        let outcome = self.ledger.record_dispatch(request.to_record()).await?;
        if let DispatchOutcome::Duplicate(id) = &outcome {
            info!(
                "Activity {} already recorded for {}/{}, not running again: {}",
                id, request.workspace, request.module, request.cmd
            );
        }
        Ok(outcome)
    }

    /// Record, run and settle inline
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteReport> {
        let outcome = self.record(&request).await?;
        let id = outcome.id().to_string();
        if outcome.is_duplicate() {
            return Ok(ExecuteReport {
                id,
                duplicate: true,
                status: None,
            });
        }

        let status = settle(&self.executor, self.ledger.as_ref(), &request, &id).await;
        Ok(ExecuteReport {
            id,
            duplicate: false,
            status: Some(status),
        })
    }
}

#[async_trait]
impl CommandDispatch for LocalDispatcher {
    async fn submit(&self, request: ExecuteRequest) -> Result<SubmitReceipt> {
        let outcome = self.record(&request).await?;
        let id = outcome.id().to_string();
        if outcome.is_duplicate() {
            return Ok(SubmitReceipt {
                id,
                duplicate: true,
            });
        }

        let executor = self.executor.clone();
        let ledger = Arc::clone(&self.ledger);
        let task_id = id.clone();
        tokio::spawn(async move {
            settle(&executor, ledger.as_ref(), &request, &task_id).await;
        });

        Ok(SubmitReceipt {
            id,
            duplicate: false,
        })
    }
}

/// Terminal status for a command's run
pub async fn run_request(executor: &CommandExecutor, request: &ExecuteRequest) -> ActivityStatus {
    let executor = if request.nolog {
        executor.with_echo(false)
    } else {
        executor.clone()
    };
    let command = request.to_command();

    match command.cmd_type {
        CmdType::Single => {
            let outcome = executor.run_one(&command).await;
            if outcome.is_success() || has_content(&command.output_path).await {
                if let CommandOutcome::Failed { error } = &outcome {
                    debug!("Failed but produced output, marking done: {}", error);
                }
                ActivityStatus::Done
            } else {
                ActivityStatus::Error
            }
        }
        CmdType::List => match executor.run_list(&command).await {
            Ok(report) if report.all_failed() => ActivityStatus::Error,
            Ok(report) => {
                debug!(
                    "List '{}' finished: {} ok, {} failed",
                    command.label(),
                    report.succeeded(),
                    report.failed()
                );
                ActivityStatus::Done
            }
            Err(e) => {
                warn!("Cannot expand resources for '{}': {}", command.label(), e);
                ActivityStatus::Error
            }
        },
    }
}

async fn settle(
    executor: &CommandExecutor,
    ledger: &dyn ActivityLedger,
    request: &ExecuteRequest,
    id: &str,
) -> ActivityStatus {
    let status = run_request(executor, request).await;
    let matcher = ActivityMatch::Id(id.to_string());
    match ledger
        .update_status(&request.workspace, &request.module, &matcher, status)
        .await
    {
        Ok(0) => debug!("Activity {} was already terminal", id),
        Ok(_) => debug!("Activity {} -> {}", id, status),
        Err(e) => error!("Could not record status {} for activity {}: {}", status, id, e),
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorSettings;
    use crate::ledger::MemoryLedger;
    use crate::poller::{wait_for_module, PollPolicy};
    use crate::subprocess::{MockProcessRunner, SubprocessManager};
    use tempfile::TempDir;

    fn dispatcher(mock: &MockProcessRunner) -> (LocalDispatcher, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let executor = CommandExecutor::new(
            SubprocessManager::new(Arc::new(mock.clone())),
            ExecutorSettings {
                success_pause: Duration::ZERO,
                echo: false,
                ..ExecutorSettings::default()
            },
        );
        (
            LocalDispatcher::new(executor, ledger.clone() as Arc<dyn ActivityLedger>),
            ledger,
        )
    }

    fn request(cmd: &str) -> ExecuteRequest {
        ExecuteRequest::from_command(&ResolvedCommand::single(cmd, "probe"), "example.com")
    }

    #[tokio::test]
    async fn test_execute_success_is_done() {
        let mock = MockProcessRunner::new();
        mock.expect_command("echo hi").returns_output("hi\n").finish();
        let (dispatcher, ledger) = dispatcher(&mock);

        let report = dispatcher.execute(request("echo hi")).await.unwrap();
        assert_eq!(report.status, Some(ActivityStatus::Done));

        let records = ledger.query_status("example.com", "probe").await.unwrap();
        assert_eq!(records[0].status, ActivityStatus::Done);
    }

    #[tokio::test]
    async fn test_execute_failure_is_error() {
        let mock = MockProcessRunner::new();
        mock.expect_command("exit 1").returns_exit_code(1).finish();
        let (dispatcher, _) = dispatcher(&mock);

        let report = dispatcher.execute(request("exit 1")).await.unwrap();
        assert_eq!(report.status, Some(ActivityStatus::Error));
    }

    #[tokio::test]
    async fn test_failure_with_output_counts_as_done() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("partial.txt");
        let mock = MockProcessRunner::new();
        mock.expect_command("scanner").returns_exit_code(2).finish();
        let (dispatcher, _) = dispatcher(&mock);

        let mut req = request("scanner");
        req.output_path = out.display().to_string();
        req.forced = true;
        std::fs::write(&out, "found.example.com\n").unwrap();

        let report = dispatcher.execute(req).await.unwrap();
        assert_eq!(report.status, Some(ActivityStatus::Done));
    }

    #[tokio::test]
    async fn test_duplicate_not_run_twice() {
        let mock = MockProcessRunner::succeeding();
        let (dispatcher, ledger) = dispatcher(&mock);

        let first = dispatcher.execute(request("echo once")).await.unwrap();
        let second = dispatcher.execute(request("echo once")).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.status, None);
        assert_eq!(first.id, second.id);
        assert!(mock.verify_called("echo once", 1));
        assert_eq!(ledger.query_status("example.com", "probe").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_runs_in_background() {
        let mock = MockProcessRunner::succeeding().with_latency(Duration::from_millis(50));
        let (dispatcher, ledger) = dispatcher(&mock);

        let receipt = dispatcher.submit(request("slow tool")).await.unwrap();
        assert!(!receipt.duplicate);

        let policy = PollPolicy {
            delay: Duration::from_millis(10),
            max_retries: 0,
            log_every: 10,
        };
        let outcome = wait_for_module(ledger.as_ref(), "example.com", "probe", &policy).await;
        assert!(!outcome.was_forced());

        let records = ledger.query_status("example.com", "probe").await.unwrap();
        assert_eq!(records[0].id, receipt.id);
        assert_eq!(records[0].status, ActivityStatus::Done);
    }

    #[tokio::test]
    async fn test_list_done_unless_all_fail() {
        let temp = TempDir::new().unwrap();
        let hosts = temp.path().join("hosts.txt");
        std::fs::write(&hosts, "a\nb\n").unwrap();

        let mock = MockProcessRunner::succeeding();
        mock.expect_command("scan a").returns_exit_code(1).finish();
        let (dispatcher, _) = dispatcher(&mock);

        let mut req = request("scan [[0]]");
        req.cmd_type = CmdType::List;
        req.resources = Some(format!("hosts|{}", hosts.display()));
        let report = dispatcher.execute(req.clone()).await.unwrap();
        assert_eq!(report.status, Some(ActivityStatus::Done));

        mock.expect_command("scan b").returns_exit_code(1).finish();
        req.speed = "again".to_string();
        let report = dispatcher.execute(req).await.unwrap();
        assert_eq!(report.status, Some(ActivityStatus::Error));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: ExecuteRequest = serde_json::from_str(
            r#"{"cmd":"echo hi","module":"probe","workspace":"example.com"}"#,
        )
        .unwrap();
        assert_eq!(req.cmd_type, CmdType::Single);
        assert!(!req.forced);
        assert!(!req.nolog);
        assert_eq!(req.to_command().cmd, "echo hi");
    }

    #[test]
    fn test_request_record_matches_command_record() {
        let command = ResolvedCommand::single("echo hi", "probe").with_output_path("/o");
        let req = ExecuteRequest::from_command(&command, "ws");
        assert_eq!(req.to_record().id, ActivityRecord::from_command(&command, "ws").id);
    }
}
