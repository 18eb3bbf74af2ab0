use crate::error::{ErrorCode, ReconError};
use std::time::Duration;

/// Failure of a single shell command.
///
/// Every variant carries the original command string so the caller can log
/// what failed; partially captured output is not part of the failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error while running '{command}': {source}")]
    IoError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' exited with code {code}")]
    ExitCode { command: String, code: i32 },

    #[error("Command '{command}' terminated by signal {signal}")]
    Signal { command: String, signal: i32 },

    #[error("Command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to capture {0}")]
    InternalError(String),

    #[error("Mock expectation not met: {0}")]
    MockExpectationNotMet(String),
}

impl ProcessError {
    /// The command string this failure belongs to, when known
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::SpawnFailed { command, .. }
            | Self::IoError { command, .. }
            | Self::ExitCode { command, .. }
            | Self::Signal { command, .. }
            | Self::Timeout { command, .. } => Some(command),
            Self::InternalError(_) | Self::MockExpectationNotMet(_) => None,
        }
    }

    /// Exit code reported by the process, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ProcessError> for ReconError {
    fn from(err: ProcessError) -> Self {
        let code = match &err {
            ProcessError::SpawnFailed { .. } => ErrorCode::EXEC_SPAWN_FAILED,
            ProcessError::IoError { .. } => ErrorCode::EXEC_OUTPUT_ERROR,
            ProcessError::ExitCode { .. } => ErrorCode::EXEC_SUBPROCESS_FAILED,
            ProcessError::Signal { .. } => ErrorCode::EXEC_SIGNAL_RECEIVED,
            ProcessError::Timeout { .. } => ErrorCode::EXEC_TIMEOUT,
            ProcessError::InternalError(_) | ProcessError::MockExpectationNotMet(_) => {
                ErrorCode::EXEC_GENERIC
            }
        };
        let command = err.command().map(str::to_string);
        let exit_code = err.exit_code();

        let mut error = ReconError::execution_with_code(code, err.to_string(), command);
        if let Some(exit_code) = exit_code {
            error = error.with_exit_code(exit_code);
        }
        error.with_source(err)
    }
}
