//! Discovery and resolution of sync-conflict copies

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::error::{RecoveryError, Result};
use crate::filter::FileFilter;
use crate::naming::{self, VERSIONS_DIR};
use crate::preservation::{self, MoveMethod};
use crate::scanner::{DirectoryScanner, FileEntry, ScanOptions};

/// Kinds of conflict artifact
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    SyncConflict,
}

/// A conflict copy found on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictArtifact {
    /// Same as `path`
    pub id: String,
    pub path: PathBuf,
    /// Derived from the name; may or may not exist
    pub original_path: PathBuf,
    pub filename: String,
    /// Root the scan started from
    pub folder_path: PathBuf,
    pub modification_time: SystemTime,
    pub size: u64,
    pub conflict_type: ConflictType,
}

impl ConflictArtifact {
    fn from_entry(entry: FileEntry, folder_path: &Path) -> Option<Self> {
        let parsed = naming::parse_conflict_name(&entry.name)?;
        let original_path = entry.path.with_file_name(parsed.original_name());

        Some(Self {
            id: entry.path.to_string_lossy().into_owned(),
            original_path,
            filename: entry.name,
            folder_path: folder_path.to_path_buf(),
            modification_time: entry.modified,
            size: entry.size,
            conflict_type: ConflictType::SyncConflict,
            path: entry.path,
        })
    }
}

/// Strategies for resolving a conflict copy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Keep mine: delete the conflict copy
    Discard,
    /// Keep theirs: move the conflict copy over the original
    Promote,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discard => f.write_str("discard"),
            Self::Promote => f.write_str("promote"),
        }
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" | "keep-mine" => Ok(Self::Discard),
            "promote" | "keep-theirs" => Ok(Self::Promote),
            other => Err(format!("unknown conflict strategy '{}'", other)),
        }
    }
}

/// Result of a resolution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConflictResolution {
    Discarded { path: PathBuf },
    Promoted {
        from: PathBuf,
        to: PathBuf,
        method: MoveMethod,
    },
}

/// Finds conflict copies and applies resolutions
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    scan_options: ScanOptions,
    cancel: Option<CancellationToken>,
}

impl ConflictResolver {
    pub fn new(scan_options: ScanOptions) -> Self {
        Self {
            scan_options,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Every conflict copy under `root`, outside the version subtree
    ///
    /// The original's existence is not checked here.
    pub async fn find_conflicts<P: AsRef<Path>>(&self, root: P) -> Result<Vec<ConflictArtifact>> {
        let root = root.as_ref();
        let mut scanner = DirectoryScanner::new(self.scan_options.clone())?
            .with_filter(FileFilter::excluding(&[VERSIONS_DIR.to_string()])?);
        if let Some(token) = &self.cancel {
            scanner = scanner.with_cancellation(token.clone());
        }

        let conflicts: Vec<ConflictArtifact> = scanner
            .scan(root)
            .await?
            .into_iter()
            .filter_map(|entry| ConflictArtifact::from_entry(entry, root))
            .collect();

        tracing::debug!(root = %root.display(), count = conflicts.len(), "Conflict scan finished");
        Ok(conflicts)
    }

    /// Apply `strategy` to the conflict copy at `path`
    ///
    /// The name is checked against the conflict grammar again before
    /// anything is touched.
    pub async fn resolve<P: AsRef<Path>>(
        &self,
        path: P,
        strategy: ConflictStrategy,
    ) -> Result<ConflictResolution> {
        let path = path.as_ref();
        let original_path = naming::conflict_original_path(path).ok_or_else(|| {
            RecoveryError::invalid_artifact(path, "name does not match the conflict pattern")
        })?;

        match strategy {
            ConflictStrategy::Discard => {
                fs::remove_file(path)
                    .await
                    .map_err(|e| RecoveryError::from_io(path, e))?;
                tracing::info!(path = %path.display(), "Discarded conflict copy");
                Ok(ConflictResolution::Discarded {
                    path: path.to_path_buf(),
                })
            }
            ConflictStrategy::Promote => {
                let metadata = fs::symlink_metadata(path)
                    .await
                    .map_err(|e| RecoveryError::from_io(path, e))?;
                if !metadata.is_file() {
                    return Err(RecoveryError::invalid_artifact(path, "conflict copy is not a regular file"));
                }

                let method = preservation::move_file(path, &original_path).await?;
                tracing::info!(
                    from = %path.display(),
                    to = %original_path.display(),
                    method = ?method,
                    "Promoted conflict copy"
                );
                Ok(ConflictResolution::Promoted {
                    from: path.to_path_buf(),
                    to: original_path,
                    method,
                })
            }
        }
    }

    /// Resolve a previously discovered artifact
    pub async fn resolve_artifact(
        &self,
        artifact: &ConflictArtifact,
        strategy: ConflictStrategy,
    ) -> Result<ConflictResolution> {
        self.resolve(&artifact.path, strategy).await
    }
}
