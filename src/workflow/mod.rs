//! Workflow layer: catalog resolution, hooks and the stage runner.

pub mod hooks;
pub mod resolver;
pub mod runner;

pub use hooks::{HookFn, HookRegistry};
pub use resolver::{get_routine, get_workspace_routine, resolve_module};
pub use runner::{ModuleReport, RunSettings, WorkflowReport, WorkflowRunner};
