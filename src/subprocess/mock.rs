use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ProcessOutput, ProcessRunner, ShellCommand};

/// Scripted [`ProcessRunner`] for tests.
///
/// Expectations match on a substring of the command line, first match wins.
/// Every call is recorded, and the runner tracks how many calls were in
/// flight at once so callers can assert concurrency bounds.
#[derive(Clone)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ShellCommand>>>,
    fallback: Option<MockResponse>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[derive(Clone)]
enum MockResponse {
    Output(String),
    ExitCode(i32),
    Timeout,
}

struct MockExpectation {
    pattern: String,
    response: MockResponse,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
            fallback: None,
            latency: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Commands without a matching expectation succeed with empty output
    pub fn succeeding() -> Self {
        Self {
            fallback: Some(MockResponse::Output(String::new())),
            ..Self::new()
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn expect_command(&self, pattern: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                pattern: pattern.to_string(),
                response: MockResponse::Output(String::new()),
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, pattern: &str, times: usize) -> bool {
        self.call_count(pattern) == times
    }

    pub fn call_count(&self, pattern: &str) -> usize {
        lock(&self.call_history)
            .iter()
            .filter(|cmd| cmd.command_line.contains(pattern))
            .count()
    }

    pub fn get_call_history(&self) -> Vec<ShellCommand> {
        lock(&self.call_history).clone()
    }

    /// Highest number of simultaneous `run` calls observed so far
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        lock(&self.expectations).clear();
        lock(&self.call_history).clear();
        self.max_in_flight.store(0, Ordering::SeqCst);
    }

    fn respond(&self, command: &ShellCommand) -> Result<ProcessOutput, ProcessError> {
        let mut expectations = lock(&self.expectations);

        let matched = expectations
            .iter_mut()
            .find(|e| command.command_line.contains(&e.pattern));

        let response = match matched {
            Some(expectation) => {
                expectation.times_called += 1;
                if let Some(expected) = expectation.expected_times {
                    if expectation.times_called > expected {
                        return Err(ProcessError::MockExpectationNotMet(format!(
                            "Command '{}' called {} times, expected {}",
                            command.command_line, expectation.times_called, expected
                        )));
                    }
                }
                expectation.response.clone()
            }
            None => match &self.fallback {
                Some(response) => response.clone(),
                None => {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "No expectation found for command: {}",
                        command.command_line
                    )))
                }
            },
        };

        match response {
            MockResponse::Output(output) => Ok(ProcessOutput {
                output,
                duration: self.latency,
            }),
            MockResponse::ExitCode(code) => Err(ProcessError::ExitCode {
                command: command.command_line.clone(),
                code,
            }),
            MockResponse::Timeout => Err(ProcessError::Timeout {
                command: command.command_line.clone(),
                timeout: command.timeout.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ShellCommand) -> Result<ProcessOutput, ProcessError> {
        lock(&self.call_history).push(command.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = self.respond(&command);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl MockCommandConfig {
    pub fn returns_output(mut self, output: &str) -> Self {
        self.expectation.response = MockResponse::Output(output.to_string());
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response = if code == 0 {
            MockResponse::Output(String::new())
        } else {
            MockResponse::ExitCode(code)
        };
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.expectation.response = MockResponse::Output(String::new());
        self
    }

    pub fn times_out(mut self) -> Self {
        self.expectation.response = MockResponse::Timeout;
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        lock(&self.runner.expectations).push(self.expectation);
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}
