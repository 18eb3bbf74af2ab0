//! Resource Expander: turns `label|path` list files into positional pairs.
//!
//! A resource spec names one or two newline-delimited files joined by `;;`,
//! for example `hosts|/ws/hosts.txt;;words|/ws/words.txt`. One list pairs
//! every item with an empty string. Two lists pair the first against the
//! second cycled, so a shorter second list wraps around.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{ErrorCode, ReconError};

pub const LIST_SEPARATOR: &str = ";;";
pub const LABEL_SEPARATOR: char = '|';
pub const FIRST_MARKER: &str = "[[0]]";
pub const SECOND_MARKER: &str = "[[1]]";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Malformed resource entry '{0}', expected label|path")]
    Malformed(String),

    #[error("Resource spec names {0} lists, only 1 or 2 are supported")]
    TooManyLists(usize),

    #[error("Resource spec is empty")]
    Empty,

    #[error("Failed to read resource list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ResourceError> for ReconError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Read { ref path, .. } => {
                let path = path.clone();
                ReconError::storage_with_code(
                    ErrorCode::STORAGE_NOT_FOUND,
                    err.to_string(),
                    Some(path),
                )
                .with_source(err)
            }
            other => ReconError::validation_with_code(
                ErrorCode::VALIDATION_INVALID_FORMAT,
                other.to_string(),
                Some("resources".to_string()),
            ),
        }
    }
}

/// One `label|path` entry of a resource spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceList {
    pub label: String,
    pub path: PathBuf,
}

/// Parse a resource spec without touching the filesystem
pub fn parse_spec(spec: &str) -> Result<Vec<ResourceList>, ResourceError> {
    let entries: Vec<&str> = spec
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .collect();

    match entries.len() {
        0 => return Err(ResourceError::Empty),
        1 | 2 => {}
        n => return Err(ResourceError::TooManyLists(n)),
    }

    entries
        .into_iter()
        .map(|entry| {
            let (label, path) = entry
                .split_once(LABEL_SEPARATOR)
                .ok_or_else(|| ResourceError::Malformed(entry.to_string()))?;
            if path.trim().is_empty() {
                return Err(ResourceError::Malformed(entry.to_string()));
            }
            Ok(ResourceList {
                label: label.trim().to_string(),
                path: PathBuf::from(path.trim()),
            })
        })
        .collect()
}

/// Read a list file: trimmed lines, blanks skipped
pub async fn read_list(path: &Path) -> Result<Vec<String>, ResourceError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ResourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Pure pairing of one or two already-read lists
pub fn pair_lists(first: &[String], second: Option<&[String]>) -> Vec<(String, String)> {
    match second {
        Some(second) if !second.is_empty() => first
            .iter()
            .cloned()
            .zip(second.iter().cloned().cycle())
            .collect(),
        _ => first
            .iter()
            .map(|item| (item.clone(), String::new()))
            .collect(),
    }
}

/// Expand a resource spec into `(first, second)` pairs
pub async fn expand(spec: &str) -> Result<Vec<(String, String)>, ResourceError> {
    let lists = parse_spec(spec)?;
    let first = read_list(&lists[0].path).await?;

    let second = match lists.get(1) {
        Some(list) => {
            let items = read_list(&list.path).await?;
            if items.is_empty() {
                warn!(
                    "Resource list '{}' ({}) is empty, pairing with empty strings",
                    list.label,
                    list.path.display()
                );
            }
            Some(items)
        }
        None => None,
    };

    let pairs = pair_lists(&first, second.as_deref());
    debug!("Expanded '{}' into {} pairs", spec, pairs.len());
    Ok(pairs)
}

/// Substitute the positional markers of a pair into `text`
pub fn apply_pair(text: &str, pair: &(String, String)) -> String {
    text.replace(FIRST_MARKER, &pair.0)
        .replace(SECOND_MARKER, &pair.1)
}
