//! Activity records and their lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::command::{CmdType, ResolvedCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityStatus {
    Running,
    Done,
    Error,
}

impl ActivityStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActivityStatus::Running)
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityStatus::Running => "Running",
            ActivityStatus::Done => "Done",
            ActivityStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// One dispatched command instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Checksum of the defining fields
    pub id: String,
    pub cmd: String,
    pub output_path: String,
    pub std_path: String,
    pub module: String,
    pub workspace: String,
    pub status: ActivityStatus,
    #[serde(default)]
    pub cmd_type: CmdType,
    #[serde(default)]
    pub chunk: Option<usize>,
    #[serde(default)]
    pub delay: u64,
    #[serde(default)]
    pub resources: Option<String>,
    #[serde(default)]
    pub speed: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActivityRecord {
    /// New `Running` record for a command dispatched into `workspace`
    pub fn from_command(command: &ResolvedCommand, workspace: &str) -> Self {
        let now = Utc::now();
        let mut record = Self {
            id: String::new(),
            cmd: command.cmd.clone(),
            output_path: command.output_path.clone(),
            std_path: command.std_path.clone(),
            module: command.module.clone(),
            workspace: workspace.to_string(),
            status: ActivityStatus::Running,
            cmd_type: command.cmd_type,
            chunk: command.chunk,
            delay: command.delay,
            resources: command.resources.clone(),
            speed: command.speed.clone(),
            created_at: now,
            updated_at: now,
        };
        record.id = record.checksum();
        record
    }

    /// SHA-256 over the fields that define "the same command"
    pub fn checksum(&self) -> String {
        let cmd_type = match self.cmd_type {
            CmdType::Single => "single",
            CmdType::List => "list",
        };
        let fields = [
            self.cmd.as_str(),
            self.output_path.as_str(),
            self.std_path.as_str(),
            self.module.as_str(),
            self.workspace.as_str(),
            cmd_type,
            self.resources.as_deref().unwrap_or(""),
            self.speed.as_str(),
        ];

        let mut hasher = Sha256::new();
        for field in fields {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn belongs_to(&self, workspace: &str, module: &str) -> bool {
        self.workspace == workspace && self.module == module
    }
}

/// Selects records within one (workspace, module) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "value")]
pub enum ActivityMatch {
    All,
    Id(String),
    Command(String),
}

impl ActivityMatch {
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        match self {
            ActivityMatch::All => true,
            ActivityMatch::Id(id) => &record.id == id,
            ActivityMatch::Command(cmd) => &record.cmd == cmd,
        }
    }
}

/// Result of `record_dispatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Recorded(String),
    /// A record with the same checksum already exists
    Duplicate(String),
}

impl DispatchOutcome {
    pub fn id(&self) -> &str {
        match self {
            DispatchOutcome::Recorded(id) | DispatchOutcome::Duplicate(id) => id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, DispatchOutcome::Duplicate(_))
    }
}

/// A module is complete when none of its records is still `Running`
pub fn module_complete(records: &[ActivityRecord]) -> bool {
    records.iter().all(|r| r.status.is_terminal())
}

pub fn count_running(records: &[ActivityRecord]) -> usize {
    records.iter().filter(|r| !r.status.is_terminal()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> ResolvedCommand {
        ResolvedCommand::single("echo hi", "subdomain").with_output_path("/ws/out.txt")
    }

    #[test]
    fn test_checksum_is_stable_and_field_sensitive() {
        let a = ActivityRecord::from_command(&command(), "example.com");
        let b = ActivityRecord::from_command(&command(), "example.com");
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);

        let other_ws = ActivityRecord::from_command(&command(), "other.com");
        assert_ne!(a.id, other_ws.id);

        let mut other_speed = command();
        other_speed.speed = "slow".to_string();
        assert_ne!(a.id, ActivityRecord::from_command(&other_speed, "example.com").id);
    }

    #[test]
    fn test_checksum_ignores_status_and_timestamps() {
        let mut record = ActivityRecord::from_command(&command(), "example.com");
        let id = record.id.clone();
        record.status = ActivityStatus::Done;
        record.updated_at = Utc::now();
        assert_eq!(record.checksum(), id);
    }

    #[test]
    fn test_field_boundaries_matter() {
        let a = ResolvedCommand::single("ab", "c");
        let b = ResolvedCommand::single("a", "bc");
        assert_ne!(
            ActivityRecord::from_command(&a, "w").id,
            ActivityRecord::from_command(&b, "w").id
        );
    }

    #[test]
    fn test_status_serializes_capitalized() {
        assert_eq!(
            serde_json::to_string(&ActivityStatus::Running).unwrap(),
            "\"Running\""
        );
        assert!(ActivityStatus::Error.is_terminal());
        assert!(!ActivityStatus::Running.is_terminal());
    }

    #[test]
    fn test_module_complete() {
        let mut record = ActivityRecord::from_command(&command(), "w");
        assert!(module_complete(&[]));
        assert!(!module_complete(std::slice::from_ref(&record)));
        record.status = ActivityStatus::Error;
        assert!(module_complete(&[record]));
    }

    #[test]
    fn test_activity_match() {
        let record = ActivityRecord::from_command(&command(), "w");
        assert!(ActivityMatch::All.matches(&record));
        assert!(ActivityMatch::Id(record.id.clone()).matches(&record));
        assert!(ActivityMatch::Command("echo hi".into()).matches(&record));
        assert!(!ActivityMatch::Command("echo bye".into()).matches(&record));
    }
}
