//! Error types for cartographer-core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cartographer operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read ZIP archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Could not start browser session: {0}")]
    SessionStart(String),

    #[error("Page element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Upload rejected for {path}: {reason}")]
    UploadRejected { path: PathBuf, reason: String },

    #[error("Download did not finish: {reason}")]
    DownloadIncomplete { reason: String },

    #[error("Job for {path} is {state}, expected {expected}")]
    InvalidJobState {
        path: PathBuf,
        state: String,
        expected: String,
    },

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("yt-dlp failed: {0}")]
    Download(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify a job-scoped error.
    ///
    /// Returns `None` for errors that end the whole run (no session, or
    /// cancellation), which the run loop propagates instead of recording.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::SessionStart(_) | Error::Cancelled => None,
            Error::ElementNotFound { .. } => Some(FailureKind::ElementNotFound),
            Error::UploadRejected { .. } => Some(FailureKind::UploadRejected),
            Error::DownloadIncomplete { .. } => Some(FailureKind::DownloadIncomplete),
            Error::Browser(_) => Some(FailureKind::Browser),
            _ => Some(FailureKind::Other),
        }
    }
}

/// Why a single generation job did not produce an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The remote page no longer has a control we rely on
    ElementNotFound,
    /// The remote service refused the audio file
    UploadRejected,
    /// The remote service reported an error for the job
    Failed,
    /// No terminal state was observed before the deadline
    TimedOut,
    /// The archive never finished writing locally
    DownloadIncomplete,
    /// The browser connection itself misbehaved
    Browser,
    /// Anything else (local IO and the like)
    Other,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElementNotFound => write!(f, "ElementNotFound"),
            Self::UploadRejected => write!(f, "UploadRejected"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::DownloadIncomplete => write!(f, "DownloadIncomplete"),
            Self::Browser => write!(f, "Browser"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Result type alias for cartographer operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_scoped_errors_have_no_failure_kind() {
        assert_eq!(Error::SessionStart("no chrome".into()).failure_kind(), None);
        assert_eq!(Error::Cancelled.failure_kind(), None);
    }

    #[test]
    fn test_job_scoped_errors_classify() {
        let err = Error::ElementNotFound {
            selector: "input[type='file']".into(),
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::ElementNotFound));

        let err = Error::UploadRejected {
            path: PathBuf::from("a.m4a"),
            reason: "too large".into(),
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::UploadRejected));

        let err = Error::DownloadIncomplete {
            reason: "still growing".into(),
        };
        assert_eq!(err.failure_kind(), Some(FailureKind::DownloadIncomplete));

        let err = Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.failure_kind(), Some(FailureKind::Other));
    }
}
