use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::outcome::ErrorKind;
use crate::target::FetchTarget;

/// One failed target, as written to `fetch_errors.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub build: String,
    pub platform: String,
    pub source_url: String,
    pub error_kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    pub attempts: u32,
}

impl ErrorEntry {
    pub fn is_auth_failure(&self) -> bool {
        self.error_kind == "auth_failure"
    }
}

/// Errors that can occur when persisting the error report.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to write error report {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode error report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only list of failures, in the order they were observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorReport {
    entries: Vec<ErrorEntry>,
}

impl ErrorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        target: &FetchTarget,
        error_kind: ErrorKind,
        message: impl Into<String>,
        attempts: u32,
    ) {
        self.entries.push(ErrorEntry {
            build: target.build().to_owned(),
            platform: target.platform().to_owned(),
            source_url: target.source_url().to_owned(),
            error_kind: error_kind.tag().to_owned(),
            status: error_kind.status(),
            message: message.into(),
            attempts,
        });
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first authentication failure, if the run hit one.
    pub fn auth_failure(&self) -> Option<&ErrorEntry> {
        self.entries.iter().find(|e| e.is_auth_failure())
    }

    /// Write the report as a pretty JSON array. Creates the parent directory.
    pub fn flush(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(&self.entries)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a report left behind by an earlier run. Missing files are fine.
    pub fn remove_stale(path: &Path) -> Result<(), ReportError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ReportError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
