//! Per-command execution with skip-if-done semantics, and the chunked executor.

pub mod chunked;

pub use chunked::ChunkReport;

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::ResolvedCommand;
use crate::subprocess::{ShellCommandBuilder, SubprocessManager};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Pause after a batch where every command succeeded
    pub success_pause: Duration,
    /// Kill timeout when a command declares none
    pub default_timeout: Option<Duration>,
    /// Batch size for list commands without a `chunk`
    pub default_chunk: usize,
    /// Echo process output to stdout
    pub echo: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            success_pause: Duration::from_secs(1),
            default_timeout: None,
            default_chunk: 5,
            echo: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded { output: String },
    /// `output_path` already had content and the command was not forced
    Skipped,
    Failed { error: String },
}

impl CommandOutcome {
    /// Skipped counts as success
    pub fn is_success(&self) -> bool {
        !matches!(self, CommandOutcome::Failed { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            CommandOutcome::Succeeded { output } => Some(output),
            _ => None,
        }
    }
}

/// True when `path` names a regular file with at least one byte
pub async fn has_content(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > 0,
        Err(_) => false,
    }
}

#[derive(Clone)]
pub struct CommandExecutor {
    subprocess: SubprocessManager,
    settings: ExecutorSettings,
}

impl CommandExecutor {
    pub fn new(subprocess: SubprocessManager, settings: ExecutorSettings) -> Self {
        Self {
            subprocess,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Same executor with output echo switched on or off
    pub fn with_echo(&self, echo: bool) -> Self {
        let mut executor = self.clone();
        executor.settings.echo = echo;
        executor
    }

    /// Run one concrete command. Failures are returned as data.
    pub async fn run_one(&self, command: &ResolvedCommand) -> CommandOutcome {
        if !command.forced && has_content(&command.output_path).await {
            info!(
                "Skipping '{}', output already present at {}",
                command.label(),
                command.output_path
            );
            return CommandOutcome::Skipped;
        }

        let shell = ShellCommandBuilder::new(&command.cmd)
            .maybe_timeout(command.timeout.or(self.settings.default_timeout))
            .echo(self.settings.echo)
            .build();

        debug!("[{}] {}", command.module, command.cmd);
        match self.subprocess.run(shell).await {
            Ok(result) => {
                if !command.std_path.is_empty() {
                    if let Err(e) = persist_output(&command.std_path, &result.output).await {
                        warn!("Could not write captured output to {}: {}", command.std_path, e);
                    }
                }
                debug!("'{}' finished in {:?}", command.label(), result.duration);
                CommandOutcome::Succeeded {
                    output: result.output,
                }
            }
            Err(e) => {
                warn!("Command failed: {}", e);
                CommandOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn persist_output(path: &str, output: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, output).await
}
