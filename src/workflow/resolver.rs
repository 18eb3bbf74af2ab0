//! Workflow Resolver: catalog templates to fully resolved commands.

use std::collections::BTreeMap;
use tracing::debug;

use crate::catalog::Catalog;
use crate::command::ResolvedCommand;
use crate::error::Result;
use crate::options::OptionSet;
use crate::resolve::unresolved_tokens;
use crate::workspace::WorkspaceStore;

/// Resolve one module's commands for `profile`.
///
/// Templates are resolved against the stage options, so `$CURRENT_MODULE`
/// and `$CURRENT_SPEED` are available. An undefined profile yields no
/// commands, meaning the module is skipped at that speed.
pub fn resolve_module(
    catalog: &Catalog,
    options: &OptionSet,
    module: &str,
    profile: &str,
) -> Vec<ResolvedCommand> {
    let stage = options.for_stage(module, profile);
    catalog
        .commands(module, profile)
        .iter()
        .map(|template| {
            let resolved = template.resolve(&stage, module, profile);
            let leftover = unresolved_tokens(&resolved.cmd, &stage);
            if !leftover.is_empty() {
                debug!(
                    "Command '{}' keeps unresolved placeholders: {:?}",
                    resolved.label(),
                    leftover
                );
            }
            resolved
        })
        .collect()
}

/// Every module of the catalog, resolved for `profile`
pub fn get_routine(
    catalog: &Catalog,
    options: &OptionSet,
    profile: &str,
) -> BTreeMap<String, Vec<ResolvedCommand>> {
    catalog
        .modules
        .keys()
        .map(|module| (module.clone(), resolve_module(catalog, options, module, profile)))
        .collect()
}

/// [`get_routine`] for a persisted workspace; unreadable options are fatal
pub async fn get_workspace_routine(
    store: &WorkspaceStore,
    catalog: &Catalog,
    workspace: &str,
    profile: &str,
) -> Result<BTreeMap<String, Vec<ResolvedCommand>>> {
    let options = store.load_options(workspace).await?;
    Ok(get_routine(catalog, &options, profile))
}
