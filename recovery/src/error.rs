//! Error types for the artifact recovery engine

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Named steps of the multi-step mutations (restore, archive, promote, dedup)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationStep {
    /// Copy of the current original to `<original>.backup`
    Backup,
    /// Copy of the version artifact over the original
    CopyVersion,
    /// Removal of the consumed version artifact
    RemoveVersion,
    /// Copy of a source file to its destination
    CopySource,
    /// Removal of the source after a confirmed copy
    RemoveSource,
    /// Re-hash of a duplicate right before it is deleted
    VerifyDuplicate,
    /// Deletion of a verified duplicate
    RemoveDuplicate,
}

impl fmt::Display for OperationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Backup => "backup",
            Self::CopyVersion => "copy version",
            Self::RemoveVersion => "remove version",
            Self::CopySource => "copy source",
            Self::RemoveSource => "remove source",
            Self::VerifyDuplicate => "verify duplicate",
            Self::RemoveDuplicate => "remove duplicate",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for recovery operations
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// IO errors that carry no more specific classification
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Target vanished between discovery and action
    #[error("Not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Filename no longer matches the expected grammar
    #[error("Invalid artifact '{path}': {reason}")]
    InvalidArtifact { path: PathBuf, reason: String },

    /// The OS denied the operation
    #[error("Permission error at '{path}': {message}")]
    Permission { path: PathBuf, message: String },

    /// A multi-step operation stopped part way
    #[error("Partial failure at '{path}': {completed} completed, {failed} failed: {message}")]
    PartialFailure {
        path: PathBuf,
        completed: OperationStep,
        failed: OperationStep,
        message: String,
    },

    /// Filter pattern errors
    #[error("Filter pattern error: {0}")]
    FilterPattern(String),

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Ignore file read/write errors
    #[error("Ignore file error at '{path}': {message}")]
    IgnoreFile { path: PathBuf, message: String },

    /// Cancellation error
    #[error("Operation was cancelled")]
    Cancelled,
}

impl RecoveryError {
    /// Classify an IO error raised while operating on `path`
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::Permission {
                path,
                message: err.to_string(),
            },
            _ => Self::Io(err),
        }
    }

    /// Create a new not-found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a new invalid artifact error
    pub fn invalid_artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new permission error
    pub fn permission_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Permission {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new partial failure error
    pub fn partial_failure(
        path: impl Into<PathBuf>,
        completed: OperationStep,
        failed: OperationStep,
        message: impl Into<String>,
    ) -> Self {
        Self::PartialFailure {
            path: path.into(),
            completed,
            failed,
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new ignore file error
    pub fn ignore_file_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IgnoreFile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether re-scanning and retrying is likely to help
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
