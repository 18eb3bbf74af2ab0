//! Command catalog: named workflows and per-module, per-profile templates.
//!
//! ```yaml
//! workflows:
//!   general: [subdomain, probing]
//! modules:
//!   subdomain:
//!     quick:
//!       - banner: subfinder
//!         cmd: subfinder -d $TARGET -o $WORKSPACE/subdomain/subfinder.txt
//! ```
//!
//! The catalog is read-only once loaded. Load and validation failures are fatal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::command::{CmdType, CommandTemplate};
use crate::error::{ErrorCode, ReconError, Result};
use crate::workflow::hooks::HookRegistry;

const BUILTIN_CATALOG: &str = include_str!("../../catalog/default.yaml");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Workflow name -> ordered module names
    pub workflows: BTreeMap<String, Vec<String>>,
    /// Module -> profile -> commands
    pub modules: BTreeMap<String, BTreeMap<String, Vec<CommandTemplate>>>,
}

impl Catalog {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_INVALID_YAML,
                "Invalid command catalog",
            )
            .with_source(e)
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReconError::config_with_code(
                ErrorCode::CONFIG_NOT_FOUND,
                format!("Cannot read command catalog {}", path.display()),
            )
            .with_source(e)
        })?;
        let catalog = Self::from_yaml_str(&content)
            .map_err(|e| e.with_context(path.display()))?;
        debug!(
            "Loaded catalog {} with {} modules, {} workflows",
            path.display(),
            catalog.modules.len(),
            catalog.workflows.len()
        );
        Ok(catalog)
    }

    /// The catalog shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    /// Load and validate either `path` or the built-in catalog
    pub async fn load_validated(path: Option<&Path>, hooks: &HookRegistry) -> Result<Self> {
        let catalog = match path {
            Some(path) => Self::load(path).await?,
            None => Self::builtin()?,
        };
        catalog.validate(hooks)?;
        Ok(catalog)
    }

    /// Commands of `module` for `profile`; empty when either is undefined
    pub fn commands(&self, module: &str, profile: &str) -> &[CommandTemplate] {
        self.modules
            .get(module)
            .and_then(|profiles| profiles.get(profile))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn workflow(&self, name: &str) -> Result<&[String]> {
        self.workflows
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                ReconError::workflow_with_code(
                    ErrorCode::WORKFLOW_NOT_FOUND,
                    format!(
                        "Unknown workflow '{}', available: {}",
                        name,
                        self.workflows.keys().cloned().collect::<Vec<_>>().join(", ")
                    ),
                    Some(name.to_string()),
                )
            })
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn profiles(&self, module: &str) -> Vec<&str> {
        self.modules
            .get(module)
            .map(|p| p.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check structural rules and hook names against `hooks`
    pub fn validate(&self, hooks: &HookRegistry) -> Result<()> {
        for (workflow, modules) in &self.workflows {
            for module in modules {
                if !self.has_module(module) {
                    return Err(ReconError::workflow_with_code(
                        ErrorCode::WORKFLOW_MODULE_NOT_FOUND,
                        format!("Workflow references unknown module '{}'", module),
                        Some(workflow.clone()),
                    )
                    .with_module(module.clone()));
                }
            }
        }

        for (module, profiles) in &self.modules {
            for (profile, templates) in profiles {
                for (index, template) in templates.iter().enumerate() {
                    let at = format!("{}/{}[{}]", module, profile, index);
                    validate_template(template, hooks).map_err(|e| e.with_context(&at))?;
                }
            }
        }
        Ok(())
    }
}

fn validate_template(template: &CommandTemplate, hooks: &HookRegistry) -> Result<()> {
    if template.cmd.trim().is_empty() {
        return Err(ReconError::validation_with_code(
            ErrorCode::VALIDATION_REQUIRED_FIELD,
            "Command is empty",
            Some("cmd".to_string()),
        ));
    }
    if template.cmd_type == CmdType::List
        && template.resources.as_deref().map_or(true, |r| r.trim().is_empty())
    {
        return Err(ReconError::validation_with_code(
            ErrorCode::VALIDATION_REQUIRED_FIELD,
            "List command needs resources",
            Some("resources".to_string()),
        ));
    }
    if template.chunk == Some(0) {
        return Err(ReconError::validation_with_code(
            ErrorCode::VALIDATION_OUT_OF_RANGE,
            "Chunk size must be at least 1",
            Some("chunk".to_string()),
        ));
    }
    for hook in template.hooks() {
        if !hooks.contains(hook) {
            return Err(ReconError::config_with_code(
                ErrorCode::CONFIG_UNKNOWN_HOOK,
                format!(
                    "Unknown hook '{}', registered: {}",
                    hook,
                    hooks.names().join(", ")
                ),
            ));
        }
    }
    Ok(())
}
