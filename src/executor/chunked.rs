//! Chunked Executor: bounded batches with an inter-batch pause.

use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CommandExecutor, CommandOutcome};
use crate::command::ResolvedCommand;
use crate::resources::{self, ResourceError};

/// Outcomes of a chunked run, in command order
#[derive(Debug, Clone, Default)]
pub struct ChunkReport {
    pub outcomes: Vec<CommandOutcome>,
    pub batches: usize,
}

impl ChunkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// True when there was at least one command and none succeeded
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }
}

/// Pause after a batch: the full delay after any failure, otherwise the
/// shorter of the success pause and the delay
pub fn batch_pause(any_failed: bool, delay: Duration, success_pause: Duration) -> Duration {
    if any_failed {
        delay
    } else {
        success_pause.min(delay)
    }
}

impl CommandExecutor {
    /// Run `commands` in consecutive batches of at most `chunk_size`.
    ///
    /// Members of a batch run concurrently; batches run one after another.
    /// No pause follows the last batch.
    pub async fn run_chunked(
        &self,
        commands: &[ResolvedCommand],
        chunk_size: usize,
        delay: Duration,
    ) -> ChunkReport {
        let size = if chunk_size == 0 {
            warn!("Chunk size 0 requested, running one command at a time");
            1
        } else {
            chunk_size
        };

        let total_batches = commands.len().div_ceil(size);
        let mut report = ChunkReport::default();

        for (index, batch) in commands.chunks(size).enumerate() {
            debug!(
                "Running batch {}/{} with {} commands",
                index + 1,
                total_batches,
                batch.len()
            );
            let outcomes = join_all(batch.iter().map(|cmd| self.run_one(cmd))).await;
            let any_failed = outcomes.iter().any(|o| !o.is_success());
            report.outcomes.extend(outcomes);
            report.batches += 1;

            if index + 1 < total_batches {
                let pause = batch_pause(any_failed, delay, self.settings.success_pause);
                if !pause.is_zero() {
                    debug!("Pausing {:?} before next batch", pause);
                    tokio::time::sleep(pause).await;
                }
            }
        }

        report
    }

    /// Expand a list command through its resources and run the result chunked
    pub async fn run_list(&self, command: &ResolvedCommand) -> Result<ChunkReport, ResourceError> {
        let spec = command.resources.as_deref().unwrap_or_default();
        let commands = expand_list(command, spec).await?;
        let chunk = command.chunk.unwrap_or(self.settings.default_chunk);

        info!(
            "'{}' expanded into {} commands, chunk {}, delay {}s",
            command.label(),
            commands.len(),
            chunk,
            command.delay
        );
        Ok(self
            .run_chunked(&commands, chunk, Duration::from_secs(command.delay))
            .await)
    }
}

/// One concrete single command per resource pair
pub async fn expand_list(
    command: &ResolvedCommand,
    spec: &str,
) -> Result<Vec<ResolvedCommand>, ResourceError> {
    let pairs = resources::expand(spec).await?;
    Ok(pairs.iter().map(|pair| command.for_pair(pair)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CmdType;
    use crate::executor::ExecutorSettings;
    use crate::subprocess::{MockProcessRunner, SubprocessManager};
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn executor(mock: &MockProcessRunner, success_pause: Duration) -> CommandExecutor {
        CommandExecutor::new(
            SubprocessManager::new(Arc::new(mock.clone())),
            ExecutorSettings {
                success_pause,
                echo: false,
                ..ExecutorSettings::default()
            },
        )
    }

    fn commands(n: usize) -> Vec<ResolvedCommand> {
        (0..n)
            .map(|i| ResolvedCommand::single(format!("probe {i}"), "m"))
            .collect()
    }

    #[tokio::test]
    async fn test_chunk_bound_respected() {
        let mock = MockProcessRunner::succeeding().with_latency(Duration::from_millis(30));
        let report = executor(&mock, Duration::ZERO)
            .run_chunked(&commands(7), 3, Duration::ZERO)
            .await;

        assert_eq!(report.batches, 3);
        assert_eq!(report.outcomes.len(), 7);
        assert_eq!(report.succeeded(), 7);
        assert_eq!(mock.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_zero_chunk_runs_sequentially() {
        let mock = MockProcessRunner::succeeding().with_latency(Duration::from_millis(10));
        let report = executor(&mock, Duration::ZERO)
            .run_chunked(&commands(3), 0, Duration::ZERO)
            .await;

        assert_eq!(report.batches, 3);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_batches() {
        let mock = MockProcessRunner::succeeding();
        mock.expect_command("probe 1").returns_exit_code(1).finish();

        let report = executor(&mock, Duration::ZERO)
            .run_chunked(&commands(4), 2, Duration::ZERO)
            .await;

        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 3);
        assert!(!report.all_failed());
        assert_eq!(mock.get_call_history().len(), 4);
    }

    #[test]
    fn test_batch_pause_asymmetry() {
        let delay = Duration::from_secs(10);
        let pause = Duration::from_secs(1);
        assert_eq!(batch_pause(true, delay, pause), delay);
        assert_eq!(batch_pause(false, delay, pause), pause);
        assert_eq!(batch_pause(false, Duration::ZERO, pause), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_no_pause_after_last_batch() {
        let mock = MockProcessRunner::new();
        mock.expect_command("probe").returns_exit_code(1).finish();

        let start = Instant::now();
        executor(&mock, Duration::ZERO)
            .run_chunked(&commands(2), 2, Duration::from_secs(30))
            .await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_run_list_expands_resources() {
        let temp = TempDir::new().unwrap();
        let hosts = temp.path().join("hosts.txt");
        std::fs::write(&hosts, "a.com\nb.com\nc.com\n").unwrap();

        let mut command = ResolvedCommand::single("nmap [[0]]", "portscan");
        command.cmd_type = CmdType::List;
        command.resources = Some(format!("hosts|{}", hosts.display()));
        command.chunk = Some(2);

        let mock = MockProcessRunner::succeeding();
        let report = executor(&mock, Duration::ZERO)
            .run_list(&command)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.batches, 2);
        let cmds: Vec<_> = mock
            .get_call_history()
            .into_iter()
            .map(|c| c.command_line)
            .collect();
        assert!(cmds.contains(&"nmap a.com".to_string()));
        assert!(cmds.contains(&"nmap c.com".to_string()));
    }

    #[tokio::test]
    async fn test_run_list_missing_resource() {
        let mut command = ResolvedCommand::single("nmap [[0]]", "portscan");
        command.cmd_type = CmdType::List;
        command.resources = Some("hosts|/no/such/file".to_string());

        let mock = MockProcessRunner::succeeding();
        let err = executor(&mock, Duration::ZERO)
            .run_list(&command)
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Read { .. }));
    }
}
