use std::fmt;

use chrono::{DateTime, FixedOffset};

use crate::target::FetchTarget;
use crate::transport::TransportError;

/// Why a target failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 401/403. Aborts the whole run.
    AuthFailure { status: u16 },
    /// Any other non-2xx status, after retries.
    HttpFailure { status: u16 },
    /// Network error or timeout, after retries.
    ConnectionFailure,
    /// The artifact or its metadata could not be written.
    FilesystemFailure,
}

impl ErrorKind {
    pub fn from_transport(error: &TransportError) -> Self {
        match error {
            TransportError::Http { status, .. } if error.is_auth() => {
                Self::AuthFailure { status: *status }
            }
            TransportError::Http { status, .. } => Self::HttpFailure { status: *status },
            TransportError::Connection(_) => Self::ConnectionFailure,
        }
    }

    /// Stable snake_case tag used in the error report.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AuthFailure { .. } => "auth_failure",
            Self::HttpFailure { .. } => "http_failure",
            Self::ConnectionFailure => "connection_failure",
            Self::FilesystemFailure => "filesystem_failure",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthFailure { status } | Self::HttpFailure { status } => Some(*status),
            Self::ConnectionFailure | Self::FilesystemFailure => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "{} ({status})", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

/// Result of processing a single target. Never mutated once produced.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success {
        bytes_written: u64,
        fetched_at: DateTime<FixedOffset>,
    },
    Failure {
        error_kind: ErrorKind,
        message: String,
        attempts_made: u32,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// A target paired with what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub target: FetchTarget,
    pub outcome: FetchOutcome,
}
