use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

use super::error::ProcessError;

/// A shell command line to run through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub command_line: String,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    /// Kill the whole process group once this elapses
    pub timeout: Option<Duration>,
    /// Echo every output line to stdout while it is captured
    pub echo: bool,
}

/// Captured, merged stdout+stderr of a successful command
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub output: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Error(i32),
    Signal(i32),
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Success)
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Success => Some(0),
            ExitStatus::Error(code) => Some(*code),
            ExitStatus::Signal(_) => None,
        }
    }
}

pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, std::io::Error>> + Send>>;

/// Runs one shell command to completion.
///
/// `Ok` only on exit code 0. Any other outcome is a [`ProcessError`] carrying
/// the original command line; output streamed so far stays on the console but
/// is not returned.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: ShellCommand) -> Result<ProcessOutput, ProcessError>;
}

pub struct TokioProcessRunner;

impl TokioProcessRunner {
    /// Decode raw line bytes, replacing invalid UTF-8, and strip the newline
    fn decode_line(raw: &[u8]) -> String {
        Self::normalize_line(String::from_utf8_lossy(raw).into_owned())
    }

    /// Normalize a line by removing trailing newlines
    fn normalize_line(mut line: String) -> String {
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        line
    }

    /// Create a line stream from a buffered reader
    fn create_line_stream<R>(reader: tokio::io::BufReader<R>) -> LineStream
    where
        R: tokio::io::AsyncRead + Send + Unpin + 'static,
    {
        use tokio::io::AsyncBufReadExt;

        Box::pin(stream::unfold(reader, |mut reader| async move {
            let mut raw = Vec::new();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => None, // EOF
                Ok(_) => Some((Ok(Self::decode_line(&raw)), reader)),
                Err(e) => Some((Err(e), reader)),
            }
        }))
    }

    fn log_command_start(command: &ShellCommand) {
        debug!("Executing shell command: {}", command.command_line);

        if !command.env.is_empty() {
            trace!("Environment overrides: {:?}", command.env);
        }
        if let Some(ref dir) = command.working_dir {
            trace!("Working directory: {:?}", dir);
        }
        if let Some(timeout) = command.timeout {
            trace!("Kill timeout: {:?}", timeout);
        }
    }

    fn configure_command(command: &ShellCommand) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&command.command_line);

        // Own process group so a timeout can take down every descendant
        #[cfg(unix)]
        cmd.process_group(0);

        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Extract a stream from a child process, converting None to error
    fn extract_stream<T>(stream: Option<T>, stream_name: &str) -> Result<T, ProcessError> {
        stream.ok_or_else(|| ProcessError::InternalError(stream_name.to_string()))
    }

    fn create_output_streams(
        child: &mut tokio::process::Child,
    ) -> Result<(LineStream, LineStream), ProcessError> {
        use tokio::io::BufReader;

        let stdout = Self::extract_stream(child.stdout.take(), "stdout")?;
        let stderr = Self::extract_stream(child.stderr.take(), "stderr")?;

        Ok((
            Self::create_line_stream(BufReader::new(stdout)),
            Self::create_line_stream(BufReader::new(stderr)),
        ))
    }

    /// Interleave stdout and stderr in arrival order into one buffer
    async fn collect_merged(
        stdout: LineStream,
        stderr: LineStream,
        echo: bool,
        command_line: &str,
    ) -> Result<String, ProcessError> {
        let mut merged = stream::select(stdout, stderr);
        let mut buffer = String::new();

        while let Some(line) = merged.next().await {
            let line = line.map_err(|source| ProcessError::IoError {
                command: command_line.to_string(),
                source,
            })?;
            if echo {
                println!("{}", line);
            }
            trace!(target: "reconflow::output", "{}", line);
            buffer.push_str(&line);
            buffer.push('\n');
        }

        Ok(buffer)
    }

    fn parse_exit_status(status: std::process::ExitStatus) -> ExitStatus {
        if status.success() {
            ExitStatus::Success
        } else if let Some(code) = status.code() {
            ExitStatus::Error(code)
        } else {
            Self::parse_signal_status(status)
        }
    }

    #[cfg(unix)]
    fn parse_signal_status(status: std::process::ExitStatus) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        match status.signal() {
            Some(signal) => ExitStatus::Signal(signal),
            None => ExitStatus::Error(1),
        }
    }

    #[cfg(not(unix))]
    fn parse_signal_status(_status: std::process::ExitStatus) -> ExitStatus {
        ExitStatus::Error(1)
    }

    #[cfg(unix)]
    fn kill_process_group(pid: Option<u32>) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
            if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                debug!("killpg({}) failed: {}", pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_process_group(_pid: Option<u32>) {}
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: ShellCommand) -> Result<ProcessOutput, ProcessError> {
        let start = Instant::now();
        Self::log_command_start(&command);

        let mut child = Self::configure_command(&command).spawn().map_err(|source| {
            error!(
                "Failed to spawn '{}': {:?} (kind: {:?})",
                command.command_line,
                source,
                source.kind()
            );
            ProcessError::SpawnFailed {
                command: command.command_line.clone(),
                source,
            }
        })?;
        let pid = child.id();
        let (stdout, stderr) = Self::create_output_streams(&mut child)?;

        let command_line = command.command_line.as_str();
        let execution = async {
            let output = Self::collect_merged(stdout, stderr, command.echo, command_line).await?;
            let status = child
                .wait()
                .await
                .map_err(|source| ProcessError::IoError {
                    command: command_line.to_string(),
                    source,
                })?;
            Ok::<_, ProcessError>((output, status))
        };

        let (output, status) = match command.timeout {
            Some(limit) => {
                let timed = tokio::time::timeout(limit, execution).await;
                match timed {
                    Ok(result) => result?,
                    Err(_) => {
                        Self::kill_process_group(pid);
                        if let Err(e) = child.kill().await {
                            debug!("Child already gone after timeout: {}", e);
                        }
                        warn!(
                            "Command timed out after {:?}, process group killed: {}",
                            limit, command.command_line
                        );
                        return Err(ProcessError::Timeout {
                            command: command.command_line.clone(),
                            timeout: limit,
                        });
                    }
                }
            }
            None => execution.await?,
        };

        let duration = start.elapsed();
        match Self::parse_exit_status(status) {
            ExitStatus::Success => {
                debug!(
                    "Command completed successfully in {:?}: {}",
                    duration, command.command_line
                );
                trace!("Captured output length: {} bytes", output.len());
                Ok(ProcessOutput { output, duration })
            }
            ExitStatus::Error(code) => {
                debug!(
                    "Command failed with exit code {} in {:?}: {}",
                    code, duration, command.command_line
                );
                Err(ProcessError::ExitCode {
                    command: command.command_line.clone(),
                    code,
                })
            }
            ExitStatus::Signal(signal) => {
                warn!(
                    "Command terminated by signal {} in {:?}: {}",
                    signal, duration, command.command_line
                );
                Err(ProcessError::Signal {
                    command: command.command_line.clone(),
                    signal,
                })
            }
        }
    }
}
