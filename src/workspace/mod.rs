//! Workspace layout and Option Set persistence.
//!
//! ```text
//! <home>/
//!   workspaces/<name>/options.json   persisted Option Set
//!   workspaces/<name>/...            tool outputs
//!   ledger/<name>/activities.json    activity ledger (file backend)
//! ```

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ErrorCode, ReconError, Result};
use crate::options::{keys, OptionSet};

const OPTIONS_FILE: &str = "options.json";

/// Write `data` to a uniquely named temp file beside `path` and rename it into place
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).await?;

    let path = path.to_path_buf();
    let data = data.to_vec();
    tokio::task::spawn_blocking(move || {
        use std::io::Write;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
        temp.write_all(&data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Reject names that would escape the workspaces root
pub fn validate_workspace_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name.contains('/') || name.contains('\\') || name.contains("..")
    {
        return Err(ReconError::validation_with_code(
            ErrorCode::VALIDATION_INVALID_FORMAT,
            format!("Invalid workspace name '{}'", name),
            Some("workspace".to_string()),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    home: PathBuf,
}

impl WorkspaceStore {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn workspaces_root(&self) -> PathBuf {
        self.home.join("workspaces")
    }

    pub fn ledger_root(&self) -> PathBuf {
        self.home.join("ledger")
    }

    pub fn workspace_dir(&self, name: &str) -> Result<PathBuf> {
        validate_workspace_name(name)?;
        Ok(self.workspaces_root().join(name))
    }

    pub fn options_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.workspace_dir(name)?.join(OPTIONS_FILE))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.options_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Create the workspace directory and persist its Option Set
    pub async fn create(&self, options: &OptionSet) -> Result<PathBuf> {
        let name = options.workspace_name().ok_or_else(|| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_MISSING_REQUIRED,
                format!("Option Set has no {} key", keys::OUTPUT),
            )
        })?;
        let dir = self.workspace_dir(name)?;
        fs::create_dir_all(&dir).await.map_err(|e| {
            ReconError::storage_with_code(
                ErrorCode::STORAGE_IO_ERROR,
                "Failed to create workspace directory",
                Some(dir.clone()),
            )
            .with_source(e)
        })?;
        self.save_options(name, options).await?;
        info!("Workspace '{}' ready at {}", name, dir.display());
        Ok(dir)
    }

    pub async fn save_options(&self, name: &str, options: &OptionSet) -> Result<()> {
        let path = self.options_path(name)?;
        let content = serde_json::to_vec_pretty(options)?;
        write_atomic(&path, &content).await.map_err(|e| {
            ReconError::storage_with_code(
                ErrorCode::STORAGE_IO_ERROR,
                "Failed to write options",
                Some(path.clone()),
            )
            .with_source(e)
        })?;
        debug!("Saved {} options to {}", options.len(), path.display());
        Ok(())
    }

    /// Load a workspace's Option Set; a missing or corrupt file is fatal
    pub async fn load_options(&self, name: &str) -> Result<OptionSet> {
        let path = self.options_path(name)?;
        let content = fs::read_to_string(&path).await.map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("Cannot read options for workspace '{}'", name),
            )
            .with_source(e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_INVALID_JSON,
                format!("Options file {} is corrupt", path.display()),
            )
            .with_source(e)
        })
    }

    /// Names of every workspace with a persisted Option Set
    pub async fn list(&self) -> Result<Vec<String>> {
        let root = self.workspaces_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().join(OPTIONS_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
