//! Registry of `pre_run`/`post_run` hooks.
//!
//! Catalog entries name hooks by string; only names registered here are
//! accepted, and the catalog is validated against the registry at load time.
//! Hooks do plain blocking file I/O and always run on the blocking pool.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::command::ResolvedCommand;
use crate::error::{ErrorCode, ReconError, Result};

pub type HookFn = fn(&ResolvedCommand) -> Result<()>;

#[derive(Clone)]
pub struct HookRegistry {
    hooks: HashMap<&'static str, HookFn>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HookRegistry {
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Registry holding the built-in hooks
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("prepare_output", prepare_output);
        registry.register("clean_output", clean_output);
        registry.register("remove_empty_output", remove_empty_output);
        registry
    }

    pub fn register(&mut self, name: &'static str, hook: HookFn) {
        self.hooks.insert(name, hook);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.hooks.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub async fn run(&self, name: &str, command: &ResolvedCommand) -> Result<()> {
        let hook = *self.hooks.get(name).ok_or_else(|| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_UNKNOWN_HOOK,
                format!("Unknown hook '{}'", name),
            )
        })?;
        debug!("Running hook {} for '{}'", name, command.label());

        let hook_failed = || {
            ReconError::workflow_with_code(
                ErrorCode::WORKFLOW_HOOK_FAILED,
                format!("Hook '{}' failed", name),
                None,
            )
            .with_module(command.module.clone())
        };

        let owned = command.clone();
        tokio::task::spawn_blocking(move || hook(&owned))
            .await
            .map_err(|e| hook_failed().with_source(e))?
            .map_err(|e| hook_failed().with_source(e))
    }
}

fn hook_io_error(path: &Path, err: std::io::Error) -> ReconError {
    ReconError::storage_with_code(
        ErrorCode::STORAGE_IO_ERROR,
        "Hook file operation failed",
        Some(path.to_path_buf()),
    )
    .with_source(err)
}

fn non_empty(path: &str) -> Option<&Path> {
    (!path.is_empty()).then(|| Path::new(path))
}

/// Create the parent directories of every output path
pub fn prepare_output(command: &ResolvedCommand) -> Result<()> {
    let paths = [
        non_empty(&command.output_path),
        non_empty(&command.std_path),
        command.cleaned_output.as_deref().and_then(non_empty),
    ];
    for path in paths.into_iter().flatten() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| hook_io_error(parent, e))?;
        }
    }
    Ok(())
}

/// Trim, dedupe and sort the lines of `output_path`.
///
/// Writes to `cleaned_output` when set, otherwise rewrites in place. A missing
/// output file is left alone.
pub fn clean_output(command: &ResolvedCommand) -> Result<()> {
    let Some(source) = non_empty(&command.output_path) else {
        return Ok(());
    };
    if !source.exists() {
        debug!("Nothing to clean, {} does not exist", source.display());
        return Ok(());
    }

    let content = fs::read_to_string(source).map_err(|e| hook_io_error(source, e))?;
    let lines: BTreeSet<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut cleaned = lines.into_iter().collect::<Vec<_>>().join("\n");
    if !cleaned.is_empty() {
        cleaned.push('\n');
    }

    let target = command
        .cleaned_output
        .as_deref()
        .and_then(non_empty)
        .unwrap_or(source);
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| hook_io_error(parent, e))?;
    }
    fs::write(target, cleaned).map_err(|e| hook_io_error(target, e))?;
    Ok(())
}

/// Delete zero-length output and capture files
pub fn remove_empty_output(command: &ResolvedCommand) -> Result<()> {
    for path in [non_empty(&command.output_path), non_empty(&command.std_path)]
        .into_iter()
        .flatten()
    {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                fs::remove_file(path).map_err(|e| hook_io_error(path, e))?;
                debug!("Removed empty output {}", path.display());
            }
            _ => {}
        }
    }
    Ok(())
}
