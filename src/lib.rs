//! # reconflow
//!
//! Scheduler and activity ledger for multi-stage reconnaissance pipelines.
//!
//! A workflow is an ordered list of modules; each module holds declarative
//! command templates per profile. Templates are resolved against a
//! workspace's Option Set, dispatched to an executor that runs them as
//! processes with bounded concurrency, and tracked in a ledger that the
//! poller watches to decide when a stage is done.
//!
//! ## Modules
//!
//! - `options` / `resolve` - Option Set and `$KEY` substitution
//! - `resources` - `label|path;;label|path` list expansion
//! - `command` / `catalog` - command templates and the YAML catalog
//! - `subprocess` - process runner with group kill on timeout
//! - `executor` - skip-if-done execution and chunked batches
//! - `ledger` - activity records with memory and JSON-file backends
//! - `poller` - wait-until-module-done with a forced-continue budget
//! - `dispatch` - the execute contract, local or remote
//! - `workflow` - routine resolution, hooks and the stage runner
//! - `api` - HTTP server and client for remote execution
//! - `config` / `workspace` / `app` - configuration, storage layout, process setup

pub mod api;
pub mod app;
pub mod catalog;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod options;
pub mod poller;
pub mod resolve;
pub mod resources;
pub mod subprocess;
pub mod workflow;
pub mod workspace;

pub use error::{ReconError, Result};
