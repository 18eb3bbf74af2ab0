//! Option Set: the flat `KEY -> value` map every template is resolved against.
//!
//! An `OptionSet` is built once per workspace by [`OptionSetBuilder`] and never
//! mutated afterwards. Per-stage values (`CURRENT_MODULE`, `CURRENT_SPEED`) are
//! layered on with [`OptionSet::for_stage`], which returns a new set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Well-known option keys
pub mod keys {
    pub const TARGET: &str = "TARGET";
    pub const WORKSPACE: &str = "WORKSPACE";
    pub const WORKSPACES: &str = "WORKSPACES";
    pub const OUTPUT: &str = "OUTPUT";
    pub const STRIP_TARGET: &str = "STRIP_TARGET";
    pub const IP: &str = "IP";
    pub const GO_PATH: &str = "GO_PATH";
    pub const PLUGINS_PATH: &str = "PLUGINS_PATH";
    pub const DATA_PATH: &str = "DATA_PATH";
    pub const CURRENT_MODULE: &str = "CURRENT_MODULE";
    pub const CURRENT_SPEED: &str = "CURRENT_SPEED";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet {
    values: BTreeMap<String, String>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Return a copy with `key` set to `value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Pure merge: `self` with every entry of `overrides` layered on top
    pub fn merge(&self, overrides: &OptionSet) -> OptionSet {
        let mut values = self.values.clone();
        values.extend(
            overrides
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        OptionSet { values }
    }

    /// Options for one workflow stage
    pub fn for_stage(&self, module: &str, speed: &str) -> OptionSet {
        self.merge(
            &OptionSet::new()
                .with(keys::CURRENT_MODULE, module)
                .with(keys::CURRENT_SPEED, speed),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Name of the workspace these options were built for
    pub fn workspace_name(&self) -> Option<&str> {
        self.get(keys::OUTPUT)
    }
}

impl<K, V> FromIterator<(K, V)> for OptionSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Host part of a target: no scheme, credentials, port or path.
///
/// Falls back to the trimmed input when it does not parse as a host.
pub fn strip_target(target: &str) -> String {
    let trimmed = target.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    match url::Url::parse(&candidate) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.trim_start_matches('[').trim_end_matches(']').to_string(),
            None => trimmed.to_string(),
        },
        Err(e) => {
            debug!("Target '{}' is not URL-like ({}), keeping as is", trimmed, e);
            trimmed.to_string()
        }
    }
}

/// Filesystem-safe workspace name for a target
pub fn workspace_name_for(target: &str) -> String {
    strip_target(target).replace(['/', ':'], "_")
}

/// Resolve the IP for a target host.
///
/// An IP literal is returned as is. Anything else goes through a DNS lookup
/// bounded by `timeout`; failure yields an empty string.
pub async fn resolve_ip(host: &str, timeout: Duration) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }

    match tokio::time::timeout(timeout, tokio::net::lookup_host((host, 80))).await {
        Ok(Ok(mut addrs)) => addrs
            .next()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default(),
        Ok(Err(e)) => {
            debug!("DNS lookup for {} failed: {}", host, e);
            String::new()
        }
        Err(_) => {
            debug!("DNS lookup for {} timed out after {:?}", host, timeout);
            String::new()
        }
    }
}

/// Builds the Option Set for a new workspace
#[derive(Debug, Clone)]
pub struct OptionSetBuilder {
    target: String,
    workspace_name: Option<String>,
    workspaces_root: PathBuf,
    go_path: Option<PathBuf>,
    plugins_path: Option<PathBuf>,
    data_path: Option<PathBuf>,
    ip: Option<String>,
    extra: OptionSet,
}

impl OptionSetBuilder {
    pub fn new(target: impl Into<String>, workspaces_root: &Path) -> Self {
        Self {
            target: target.into(),
            workspace_name: None,
            workspaces_root: workspaces_root.to_path_buf(),
            go_path: None,
            plugins_path: None,
            data_path: None,
            ip: None,
            extra: OptionSet::new(),
        }
    }

    /// Override the derived workspace name
    pub fn workspace_name(mut self, name: impl Into<String>) -> Self {
        self.workspace_name = Some(name.into());
        self
    }

    pub fn go_path(mut self, path: &Path) -> Self {
        self.go_path = Some(path.to_path_buf());
        self
    }

    pub fn plugins_path(mut self, path: &Path) -> Self {
        self.plugins_path = Some(path.to_path_buf());
        self
    }

    pub fn data_path(mut self, path: &Path) -> Self {
        self.data_path = Some(path.to_path_buf());
        self
    }

    /// Use a known IP instead of looking one up
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Extra user-supplied options; they win over derived values
    pub fn extra(mut self, extra: OptionSet) -> Self {
        self.extra = extra;
        self
    }

    /// Build without any network lookup; `IP` is set only for IP literals
    pub fn build(self) -> OptionSet {
        let stripped = strip_target(&self.target);
        let ip = self.ip.clone().unwrap_or_else(|| {
            if stripped.parse::<IpAddr>().is_ok() {
                stripped.clone()
            } else {
                String::new()
            }
        });
        self.assemble(stripped, ip)
    }

    /// Build and resolve `IP` through DNS when the target is a hostname
    pub async fn build_resolved(self, lookup_timeout: Duration) -> OptionSet {
        let stripped = strip_target(&self.target);
        let ip = match &self.ip {
            Some(ip) => ip.clone(),
            None => resolve_ip(&stripped, lookup_timeout).await,
        };
        self.assemble(stripped, ip)
    }

    fn assemble(self, stripped: String, ip: String) -> OptionSet {
        let name = self
            .workspace_name
            .unwrap_or_else(|| stripped.replace(['/', ':'], "_"));
        let workspace_dir = self.workspaces_root.join(&name);
        let display = |p: &Path| p.display().to_string();

        let mut options = OptionSet::new()
            .with(keys::TARGET, self.target.trim())
            .with(keys::STRIP_TARGET, stripped)
            .with(keys::IP, ip)
            .with(keys::OUTPUT, name)
            .with(keys::WORKSPACE, display(&workspace_dir))
            .with(keys::WORKSPACES, display(&self.workspaces_root));

        if let Some(path) = &self.go_path {
            options = options.with(keys::GO_PATH, display(path));
        }
        if let Some(path) = &self.plugins_path {
            options = options.with(keys::PLUGINS_PATH, display(path));
        }
        if let Some(path) = &self.data_path {
            options = options.with(keys::DATA_PATH, display(path));
        }

        options.merge(&self.extra)
    }
}
