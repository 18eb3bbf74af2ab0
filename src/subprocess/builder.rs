use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::subprocess::ShellCommand;

pub struct ShellCommandBuilder {
    command: ShellCommand,
}

impl ShellCommandBuilder {
    pub fn new(command_line: &str) -> Self {
        Self {
            command: ShellCommand {
                command_line: command_line.to_string(),
                env: HashMap::new(),
                working_dir: None,
                timeout: None,
                echo: true,
            },
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.command.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.command.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command.timeout = timeout;
        self
    }

    /// Disable echoing of output lines to the console
    pub fn quiet(mut self) -> Self {
        self.command.echo = false;
        self
    }

    pub fn echo(mut self, echo: bool) -> Self {
        self.command.echo = echo;
        self
    }

    pub fn build(self) -> ShellCommand {
        self.command
    }
}
