//! Assembly of the scheduler from configuration
//!
//! Builds the catalog, ledger, dispatcher and activity source that a
//! subcommand needs, choosing local or remote execution.

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::catalog::Catalog;
use crate::config::SchedulerConfig;
use crate::dispatch::{CommandDispatch, LocalDispatcher};
use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::ledger::{ActivityLedger, FileLedger};
use crate::options::OptionSet;
use crate::poller::{ActivitySource, SharedLedger};
use crate::subprocess::SubprocessManager;
use crate::workflow::{HookRegistry, WorkflowRunner};
use crate::workspace::WorkspaceStore;

pub struct Runtime {
    pub config: SchedulerConfig,
    pub store: WorkspaceStore,
    hooks: HookRegistry,
}

impl Runtime {
    pub fn new(config: SchedulerConfig) -> Self {
        let store = config.workspace_store();
        Self {
            config,
            store,
            hooks: HookRegistry::builtin(),
        }
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Load and validate the configured catalog; failures are fatal
    pub async fn catalog(&self) -> Result<Catalog> {
        let catalog = Catalog::load_validated(self.config.catalog.as_deref(), &self.hooks).await?;
        debug!(
            "Catalog has {} workflows and {} modules",
            catalog.workflows.len(),
            catalog.modules.len()
        );
        Ok(catalog)
    }

    pub fn ledger(&self) -> Arc<dyn ActivityLedger> {
        Arc::new(FileLedger::new(self.store.ledger_root()))
    }

    /// Dispatcher running commands in this process against the file ledger
    pub fn local_dispatcher(&self, echo: bool) -> LocalDispatcher {
        let executor = CommandExecutor::new(
            SubprocessManager::production(),
            self.config.executor_settings(echo),
        );
        LocalDispatcher::new(executor, self.ledger())
    }

    pub fn remote_client(&self, remote: &str) -> Result<ApiClient> {
        ApiClient::new(remote)
    }

    /// Runner wired to `remote` when given, else to a local dispatcher
    pub async fn workflow_runner(&self, remote: Option<&str>, echo: bool) -> Result<WorkflowRunner> {
        let catalog = Arc::new(self.catalog().await?);

        let (dispatch, source): (Arc<dyn CommandDispatch>, Arc<dyn ActivitySource>) = match remote {
            Some(remote) => {
                let client = Arc::new(self.remote_client(remote)?);
                client.health().await?;
                info!("Dispatching to remote executor {}", remote);
                (client.clone(), client)
            }
            None => {
                let dispatcher = self.local_dispatcher(echo);
                let ledger = dispatcher.ledger();
                (Arc::new(dispatcher), Arc::new(SharedLedger(ledger)))
            }
        };

        Ok(WorkflowRunner::new(catalog, self.hooks.clone(), dispatch, source))
    }

    /// Ledger view of `remote`, or of the local file ledger
    pub fn activity_source(&self, remote: Option<&str>) -> Result<Arc<dyn ActivitySource>> {
        Ok(match remote {
            Some(remote) => Arc::new(self.remote_client(remote)?),
            None => Arc::new(SharedLedger(self.ledger())),
        })
    }

    /// Build the Option Set for `target`, persist it and create the workspace
    pub async fn prepare_workspace(
        &self,
        target: &str,
        workspace: Option<&str>,
        extra: OptionSet,
    ) -> Result<OptionSet> {
        let mut builder = self.config.option_builder(target).extra(extra);
        if let Some(name) = workspace {
            builder = builder.workspace_name(name);
        }
        let options = builder.build_resolved(self.config.execution.dns_timeout).await;
        self.store.create(&options).await?;
        Ok(options)
    }

    pub async fn load_workspace(&self, workspace: &str) -> Result<OptionSet> {
        self.store.load_options(workspace).await
    }

    pub fn catalog_override(mut self, path: Option<&Path>) -> Self {
        if let Some(path) = path {
            self.config.catalog = Some(path.to_path_buf());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::keys;
    use tempfile::TempDir;

    fn runtime_in(temp: &TempDir) -> Runtime {
        Runtime::new(SchedulerConfig {
            home: temp.path().to_path_buf(),
            ..SchedulerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_prepare_workspace_persists_options() {
        let temp = TempDir::new().unwrap();
        let runtime = runtime_in(&temp);

        let options = runtime
            .prepare_workspace("http://10.0.0.7:8080/app", None, OptionSet::new())
            .await
            .unwrap();
        let name = options.workspace_name().unwrap().to_string();
        assert_eq!(options.get(keys::IP), Some("10.0.0.7"));

        let loaded = runtime.load_workspace(&name).await.unwrap();
        assert_eq!(loaded, options);
    }

    #[tokio::test]
    async fn test_builtin_catalog_loads() {
        let temp = TempDir::new().unwrap();
        let catalog = runtime_in(&temp).catalog().await.unwrap();
        assert!(catalog.workflow("general").is_ok());
    }

    #[tokio::test]
    async fn test_missing_catalog_override_is_fatal() {
        let temp = TempDir::new().unwrap();
        let runtime = runtime_in(&temp).catalog_override(Some(Path::new("/no/catalog.yaml")));
        assert!(runtime.catalog().await.is_err());
    }
}
