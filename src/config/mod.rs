//! Scheduler configuration
//!
//! Resolution order: built-in defaults, then the TOML file (explicit path or
//! `<home>/config.toml`), then `RECONFLOW_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ErrorCode, ReconError, Result};
use crate::executor::ExecutorSettings;
use crate::options::OptionSetBuilder;
use crate::poller::PollPolicy;
use crate::workspace::WorkspaceStore;

pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_HOME: &str = "RECONFLOW_HOME";
pub const ENV_REMOTE: &str = "RECONFLOW_REMOTE";
pub const ENV_CATALOG: &str = "RECONFLOW_CATALOG";

/// Default storage root, `~/.reconflow`
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".reconflow"))
        .unwrap_or_else(|| PathBuf::from(".reconflow"))
}

/// Expand a leading `~/` against the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Storage root for workspaces and the ledger
    pub home: PathBuf,
    /// Command catalog; the built-in one when unset
    pub catalog: Option<PathBuf>,
    /// Base URL of a remote executor
    pub remote: Option<String>,
    pub execution: ExecutionConfig,
    pub polling: PollingConfig,
    pub server: ServerConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    #[serde(with = "humantime_serde")]
    pub success_pause: Duration,
    #[serde(with = "humantime_serde")]
    pub command_timeout: Option<Duration>,
    pub default_chunk: usize,
    /// Budget for resolving the target's IP
    #[serde(with = "humantime_serde")]
    pub dns_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub max_retries: u32,
    pub log_every: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub go_path: Option<PathBuf>,
    pub plugins_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            catalog: None,
            remote: None,
            execution: ExecutionConfig::default(),
            polling: PollingConfig::default(),
            server: ServerConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            success_pause: Duration::from_secs(1),
            command_timeout: Some(Duration::from_secs(4 * 60 * 60)),
            default_chunk: 5,
            dns_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            delay: policy.delay,
            max_retries: policy.max_retries,
            log_every: policy.log_every,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(|e| {
            ReconError::config_with_code(ErrorCode::CONFIG_PARSE_ERROR, "Invalid configuration file")
                .with_source(e)
        })?;
        config.normalize();
        Ok(config)
    }

    /// Load from `explicit`, or from `<home>/config.toml` when it exists.
    ///
    /// An explicit path must exist; the implicit one is optional.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_env(explicit, |key| std::env::var(key).ok()).await
    }

    pub async fn load_with_env(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let home = env(ENV_HOME)
                    .map(|h| expand_tilde(Path::new(&h)))
                    .unwrap_or_else(default_home);
                let implicit = home.join(CONFIG_FILE);
                tokio::fs::try_exists(&implicit)
                    .await
                    .unwrap_or(false)
                    .then_some(implicit)
            }
        };

        let mut config = match path {
            Some(path) => {
                let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    ReconError::config_with_code(
                        ErrorCode::CONFIG_NOT_FOUND,
                        format!("Cannot read configuration {}", path.display()),
                    )
                    .with_source(e)
                })?;
                debug!("Loading configuration from {}", path.display());
                Self::from_toml_str(&content).map_err(|e| e.with_context(path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(env);
        Ok(config)
    }

    /// Environment overrides win over file values
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(home) = env(ENV_HOME).filter(|v| !v.is_empty()) {
            self.home = expand_tilde(Path::new(&home));
        }
        if let Some(remote) = env(ENV_REMOTE).filter(|v| !v.is_empty()) {
            self.remote = Some(remote);
        }
        if let Some(catalog) = env(ENV_CATALOG).filter(|v| !v.is_empty()) {
            self.catalog = Some(expand_tilde(Path::new(&catalog)));
        }
    }

    fn normalize(&mut self) {
        self.home = expand_tilde(&self.home);
        self.catalog = self.catalog.as_deref().map(expand_tilde);
        for path in [
            &mut self.tools.go_path,
            &mut self.tools.plugins_path,
            &mut self.tools.data_path,
        ] {
            *path = path.as_deref().map(expand_tilde);
        }
    }

    pub fn executor_settings(&self, echo: bool) -> ExecutorSettings {
        ExecutorSettings {
            success_pause: self.execution.success_pause,
            default_timeout: self.execution.command_timeout,
            default_chunk: self.execution.default_chunk.max(1),
            echo,
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            delay: self.polling.delay,
            max_retries: self.polling.max_retries,
            log_every: self.polling.log_every.max(1),
        }
    }

    pub fn workspace_store(&self) -> WorkspaceStore {
        WorkspaceStore::new(&self.home)
    }

    /// Option Set builder for `target` with the configured tool paths
    pub fn option_builder(&self, target: &str) -> OptionSetBuilder {
        let store = self.workspace_store();
        let mut builder = OptionSetBuilder::new(target, &store.workspaces_root());
        if let Some(path) = &self.tools.go_path {
            builder = builder.go_path(path);
        }
        let plugins = self
            .tools
            .plugins_path
            .clone()
            .unwrap_or_else(|| self.home.join("plugins"));
        let data = self
            .tools
            .data_path
            .clone()
            .unwrap_or_else(|| self.home.join("data"));
        builder.plugins_path(&plugins).data_path(&data)
    }
}
