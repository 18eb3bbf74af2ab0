//! Command templates as declared in the catalog, and their resolved form.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::options::OptionSet;
use crate::resolve::{resolve, resolve_opt};
use crate::resources::apply_pair;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmdType {
    #[default]
    Single,
    List,
}

/// Ordering of a command relative to its siblings in a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waiting {
    First,
    Last,
}

/// Dispatch group of a command: `first`, unset, then `last`
pub fn waiting_rank(waiting: Option<Waiting>) -> u8 {
    match waiting {
        Some(Waiting::First) => 0,
        None => 1,
        Some(Waiting::Last) => 2,
    }
}

/// One declarative command of a module profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplate {
    pub banner: String,
    pub cmd: String,
    pub output_path: String,
    pub std_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting: Option<Waiting>,
    pub cmd_type: CmdType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
    /// Seconds between list batches
    pub delay: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_output: Option<String>,
    /// Per-process kill timeout, overrides the configured default
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl CommandTemplate {
    /// Substitute `$KEY` tokens in every templated field
    pub fn resolve(&self, options: &OptionSet, module: &str, speed: &str) -> ResolvedCommand {
        ResolvedCommand {
            banner: self.banner.clone(),
            cmd: resolve(&self.cmd, options),
            output_path: resolve(&self.output_path, options),
            std_path: resolve(&self.std_path, options),
            requirement: resolve_opt(self.requirement.as_deref(), options),
            pre_run: self.pre_run.clone(),
            post_run: self.post_run.clone(),
            waiting: self.waiting,
            cmd_type: self.cmd_type,
            chunk: self.chunk,
            delay: self.delay,
            resources: resolve_opt(self.resources.as_deref(), options),
            cleaned_output: resolve_opt(self.cleaned_output.as_deref(), options),
            timeout: self.timeout,
            module: module.to_string(),
            speed: speed.to_string(),
            forced: false,
        }
    }

    pub fn hooks(&self) -> impl Iterator<Item = &str> {
        self.pre_run.iter().chain(self.post_run.iter()).map(String::as_str)
    }
}

/// A command with every placeholder substituted, ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCommand {
    pub banner: String,
    pub cmd: String,
    pub output_path: String,
    pub std_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<Waiting>,
    #[serde(default)]
    pub cmd_type: CmdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
    #[serde(default)]
    pub delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_output: Option<String>,
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    pub module: String,
    pub speed: String,
    /// Run even when `output_path` already has content
    #[serde(default)]
    pub forced: bool,
}

impl ResolvedCommand {
    /// A bare single command, mostly for ad-hoc dispatch and tests
    pub fn single(cmd: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            banner: String::new(),
            cmd: cmd.into(),
            output_path: String::new(),
            std_path: String::new(),
            requirement: None,
            pre_run: None,
            post_run: None,
            waiting: None,
            cmd_type: CmdType::Single,
            chunk: None,
            delay: 0,
            resources: None,
            cleaned_output: None,
            timeout: None,
            module: module.into(),
            speed: String::new(),
            forced: false,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_std_path(mut self, path: impl Into<String>) -> Self {
        self.std_path = path.into();
        self
    }

    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    pub fn is_list(&self) -> bool {
        self.cmd_type == CmdType::List
    }

    /// Concrete single command for one resource pair
    pub fn for_pair(&self, pair: &(String, String)) -> ResolvedCommand {
        ResolvedCommand {
            cmd: apply_pair(&self.cmd, pair),
            output_path: apply_pair(&self.output_path, pair),
            std_path: apply_pair(&self.std_path, pair),
            cmd_type: CmdType::Single,
            resources: None,
            chunk: None,
            ..self.clone()
        }
    }

    /// Name used in logs: banner when set, else the command itself
    pub fn label(&self) -> &str {
        if self.banner.is_empty() {
            &self.cmd
        } else {
            &self.banner
        }
    }
}
