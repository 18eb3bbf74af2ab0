//! Error types for the activity ledger

use std::path::PathBuf;
use thiserror::Error;

use super::types::ActivityStatus;
use crate::error::{ErrorCode, ReconError};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// I/O on the backing store failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted document could not be decoded
    #[error("Ledger document {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Another writer held the workspace lock for too long
    #[error("Timed out waiting for ledger lock {path}")]
    LockTimeout { path: PathBuf },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Workspace or module name unusable as a ledger key
    #[error("Invalid ledger key: {0}")]
    InvalidKey(String),

    /// Only Running records move, and only to a terminal status
    #[error("Cannot transition activities to {0}")]
    InvalidTransition(ActivityStatus),
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures of the store itself, as opposed to bad input
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Corrupt { .. } | Self::LockTimeout { .. }
        )
    }
}

impl From<LedgerError> for ReconError {
    fn from(err: LedgerError) -> Self {
        let (code, path) = match &err {
            LedgerError::Io { path, .. } => (ErrorCode::STORAGE_IO_ERROR, Some(path.clone())),
            LedgerError::Corrupt { path, .. } => (ErrorCode::STORAGE_CORRUPTED, Some(path.clone())),
            LedgerError::LockTimeout { path } => {
                (ErrorCode::STORAGE_LOCK_TIMEOUT, Some(path.clone()))
            }
            LedgerError::Serialization(_) => (ErrorCode::STORAGE_SERIALIZATION_ERROR, None),
            LedgerError::InvalidKey(_) => {
                return ReconError::validation_with_code(
                    ErrorCode::VALIDATION_INVALID_INPUT,
                    err.to_string(),
                    Some("workspace".to_string()),
                )
            }
            LedgerError::InvalidTransition(_) => (ErrorCode::STORAGE_INVALID_TRANSITION, None),
        };

        ReconError::storage_with_code(code, err.to_string(), path).with_source(err)
    }
}
