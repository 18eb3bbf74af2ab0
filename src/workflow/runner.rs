//! Stage runner: drives a workflow module by module.
//!
//! Modules run strictly in order. Within a module, commands are grouped by
//! their `waiting` order; each group is submitted in full and then awaited
//! through the poller before the next group starts. Failed commands never
//! stop the workflow.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::hooks::HookRegistry;
use super::resolver::resolve_module;
use crate::catalog::Catalog;
use crate::command::{waiting_rank, ResolvedCommand};
use crate::dispatch::{CommandDispatch, ExecuteRequest};
use crate::error::{ErrorCode, ReconError, Result};
use crate::ledger::ActivityStatus;
use crate::options::{keys, OptionSet};
use crate::poller::{wait_for_module, ActivitySource, PollPolicy, WaitOutcome};

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub profile: String,
    /// Bypass skip-if-done for every command
    pub forced: bool,
    /// Suppress process output echo
    pub nolog: bool,
    pub poll: PollPolicy,
}

impl RunSettings {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            forced: false,
            nolog: false,
            poll: PollPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub dispatched: usize,
    pub duplicates: usize,
    /// Commands whose requirement was missing
    pub skipped: usize,
    /// Commands that could not be handed to the executor
    pub dispatch_failures: usize,
    pub forced_continue: bool,
    pub done: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow: String,
    pub workspace: String,
    pub modules: Vec<ModuleReport>,
}

impl WorkflowReport {
    pub fn total_errors(&self) -> usize {
        self.modules.iter().map(|m| m.errors).sum()
    }
}

/// True when the requirement is unset, a directory, or a non-empty file
pub async fn requirement_met(requirement: Option<&str>) -> bool {
    let Some(path) = requirement.filter(|p| !p.is_empty()) else {
        return true;
    };
    match tokio::fs::metadata(Path::new(path)).await {
        Ok(meta) => meta.is_dir() || meta.len() > 0,
        Err(_) => false,
    }
}

pub struct WorkflowRunner {
    catalog: Arc<Catalog>,
    hooks: HookRegistry,
    dispatch: Arc<dyn CommandDispatch>,
    source: Arc<dyn ActivitySource>,
}

impl WorkflowRunner {
    pub fn new(
        catalog: Arc<Catalog>,
        hooks: HookRegistry,
        dispatch: Arc<dyn CommandDispatch>,
        source: Arc<dyn ActivitySource>,
    ) -> Self {
        Self {
            catalog,
            hooks,
            dispatch,
            source,
        }
    }

    /// Run every module of workflow `name`. Only an unknown workflow or a
    /// workspace-less Option Set is an error.
    pub async fn run_workflow(
        &self,
        name: &str,
        options: &OptionSet,
        settings: &RunSettings,
    ) -> Result<WorkflowReport> {
        let modules = self.catalog.workflow(name)?.to_vec();
        let workspace = workspace_of(options)?;

        info!(
            "Starting workflow {} on {} ({} modules, profile {})",
            name,
            workspace,
            modules.len(),
            settings.profile
        );

        let mut reports = Vec::with_capacity(modules.len());
        for module in &modules {
            let report = self.run_module(module, options, settings).await?;
            if report.errors > 0 {
                warn!("Module {} finished with {} failed activities", module, report.errors);
            }
            reports.push(report);
        }

        info!("Workflow {} on {} finished", name, workspace);
        Ok(WorkflowReport {
            workflow: name.to_string(),
            workspace: workspace.to_string(),
            modules: reports,
        })
    }

    /// Run one module and wait for all of its activities
    pub async fn run_module(
        &self,
        module: &str,
        options: &OptionSet,
        settings: &RunSettings,
    ) -> Result<ModuleReport> {
        let workspace = workspace_of(options)?;
        let mut report = ModuleReport {
            module: module.to_string(),
            ..ModuleReport::default()
        };

        let commands = resolve_module(&self.catalog, options, module, &settings.profile);
        if commands.is_empty() {
            info!("Module {} has no commands for profile {}, skipping", module, settings.profile);
            return Ok(report);
        }

        info!("Module {}: {} commands", module, commands.len());
        if let Err(e) = self.source.reset_module(workspace, module).await {
            warn!("Could not clear previous activities of {}: {}", module, e);
        }

        let mut groups: BTreeMap<u8, Vec<ResolvedCommand>> = BTreeMap::new();
        for command in commands {
            groups
                .entry(waiting_rank(command.waiting))
                .or_default()
                .push(command.forced(settings.forced));
        }

        for group in groups.into_values() {
            let started = self.dispatch_group(workspace, &group, settings, &mut report).await;

            let outcome =
                wait_for_module(self.source.as_ref(), workspace, module, &settings.poll).await;
            if let WaitOutcome::ForcedContinue { .. } = outcome {
                report.forced_continue = true;
            }

            for command in started {
                if let Some(hook) = &command.post_run {
                    if let Err(e) = self.hooks.run(hook, command).await {
                        warn!("{}", e.developer_message());
                    }
                }
            }
        }

        match self.source.snapshot(workspace, module).await {
            Ok(records) => {
                report.done = records.iter().filter(|r| r.status == ActivityStatus::Done).count();
                report.errors = records.iter().filter(|r| r.status == ActivityStatus::Error).count();
            }
            Err(e) => warn!("Could not read final state of {}: {}", module, e),
        }

        info!(
            "Module {} complete: {} done, {} errors, {} skipped",
            module, report.done, report.errors, report.skipped
        );
        Ok(report)
    }

    /// Submit a group; returns the commands that were handed off
    async fn dispatch_group<'a>(
        &self,
        workspace: &str,
        group: &'a [ResolvedCommand],
        settings: &RunSettings,
        report: &mut ModuleReport,
    ) -> Vec<&'a ResolvedCommand> {
        let mut started = Vec::new();

        for command in group {
            if !requirement_met(command.requirement.as_deref()).await {
                info!(
                    "Skipping '{}', requirement {} missing or empty",
                    command.label(),
                    command.requirement.as_deref().unwrap_or_default()
                );
                report.skipped += 1;
                continue;
            }

            if let Some(hook) = &command.pre_run {
                if let Err(e) = self.hooks.run(hook, command).await {
                    warn!("Not dispatching '{}': {}", command.label(), e.developer_message());
                    report.dispatch_failures += 1;
                    continue;
                }
            }

            if !command.banner.is_empty() {
                info!("[{}] {}", command.module, command.banner);
            }

            let request = ExecuteRequest::from_command(command, workspace).quiet(settings.nolog);
            match self.dispatch.submit(request).await {
                Ok(receipt) if receipt.duplicate => report.duplicates += 1,
                Ok(_) => {
                    report.dispatched += 1;
                    started.push(command);
                }
                Err(e) => {
                    warn!("Dispatch of '{}' failed: {}", command.label(), e);
                    report.dispatch_failures += 1;
                }
            }
        }

        started
    }
}

fn workspace_of(options: &OptionSet) -> Result<&str> {
    options.workspace_name().ok_or_else(|| {
        ReconError::config_with_code(
            ErrorCode::CONFIG_MISSING_REQUIRED,
            format!("Option Set has no {} key", keys::OUTPUT),
        )
    })
}
