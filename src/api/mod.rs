//! HTTP adapter: the activities and execute endpoints, and a client for them.
//!
//! The server exposes a [`LocalDispatcher`](crate::dispatch::LocalDispatcher)
//! over HTTP. [`ApiClient`] speaks the same protocol and implements both
//! [`CommandDispatch`](crate::dispatch::CommandDispatch) and
//! [`ActivitySource`](crate::poller::ActivitySource), so a workflow can drive
//! a remote executor exactly like a local one.

pub mod client;
pub mod server;

pub use client::ApiClient;
pub use server::ApiServer;

use serde::{Deserialize, Serialize};

use crate::ledger::{module_complete, ActivityRecord};

pub const HEALTH_PATH: &str = "/api/health";
pub const ACTIVITIES_PATH: &str = "/api/activities";
pub const EXECUTE_PATH: &str = "/api/execute";

/// Aggregate state of a module as reported by the activities endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    Done,
    Running,
}

impl ModuleState {
    pub fn of(records: &[ActivityRecord]) -> Self {
        if module_complete(records) {
            ModuleState::Done
        } else {
            ModuleState::Running
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivitiesQuery {
    pub workspace: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitiesResponse {
    pub status: ModuleState,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
    /// Records moved by a force-complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ActivitiesResponse {
    pub fn from_records(activities: Vec<ActivityRecord>) -> Self {
        Self {
            status: ModuleState::of(&activities),
            activities,
            forced: None,
            error: None,
            code: None,
        }
    }

    /// Store unreachable: never report completion
    pub fn unavailable(error: impl Into<String>, code: u16) -> Self {
        Self {
            status: ModuleState::Running,
            activities: Vec::new(),
            forced: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecuteQuery {
    /// Run inline and answer with the terminal status
    #[serde(default)]
    pub wait: bool,
}
