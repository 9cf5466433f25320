//! Version artifacts stored under the reserved `.stversions` subtree

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::error::{OperationStep, RecoveryError, Result};
use crate::naming::{self, VERSIONS_DIR};
use crate::preservation;
use crate::scanner::{DirectoryScanner, FileEntry, ScanOptions};

/// Suffix of the safety copy taken before a restore
pub const BACKUP_SUFFIX: &str = ".backup";

/// One physical version artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedFile {
    pub id: String,
    pub original_name: String,
    pub original_path: PathBuf,
    pub version_path: PathBuf,
    pub timestamp: DateTime<Local>,
    pub size: u64,
}

impl VersionedFile {
    fn from_entry(root: &Path, entry: FileEntry) -> Option<Self> {
        let parsed = naming::parse_version_name(&entry.name)?;
        let original_path = naming::original_path_for(root, &entry.path)?;

        Some(Self {
            id: entry.path.to_string_lossy().into_owned(),
            original_name: parsed.original_name,
            original_path,
            version_path: entry.path,
            timestamp: parsed.timestamp,
            size: entry.size,
        })
    }
}

/// What a restore did
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: PathBuf,
    /// Safety copy of the file that was overwritten, if one was taken
    pub backup: Option<PathBuf>,
    pub consumed_version: PathBuf,
}

/// Lists, restores, archives and prunes version artifacts
#[derive(Debug, Clone, Default)]
pub struct VersionStore {
    cancel: Option<CancellationToken>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// All version artifacts under `root`, newest first
    ///
    /// A root without a version subtree has no versions.
    pub async fn list_versions<P: AsRef<Path>>(&self, root: P) -> Result<Vec<VersionedFile>> {
        let root = root.as_ref();
        let versions_root = root.join(VERSIONS_DIR);

        match fs::metadata(&versions_root).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Ok(Vec::new()),
        }

        let mut scanner = DirectoryScanner::new(ScanOptions::default())?;
        if let Some(token) = &self.cancel {
            scanner = scanner.with_cancellation(token.clone());
        }

        let mut versions: Vec<VersionedFile> = scanner
            .scan(&versions_root)
            .await?
            .into_iter()
            .filter_map(|entry| VersionedFile::from_entry(root, entry))
            .collect();

        sort_newest_first(&mut versions);
        Ok(versions)
    }

    /// Restore `version_path` over `original_path`
    ///
    /// An existing original is first copied to `<original>.backup`; failing
    /// to do so is logged and the restore continues. The version artifact is
    /// consumed on success.
    pub async fn restore<P1: AsRef<Path>, P2: AsRef<Path>>(
        &self,
        version_path: P1,
        original_path: P2,
    ) -> Result<RestoreReport> {
        let version_path = version_path.as_ref();
        let original_path = original_path.as_ref();
        validate_version_name(version_path)?;

        fs::metadata(version_path)
            .await
            .map_err(|e| RecoveryError::from_io(version_path, e))?;

        let backup = backup_original(original_path).await;

        if let Some(parent) = original_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RecoveryError::from_io(parent, e))?;
        }
        if let Err(e) = preservation::copy_file(version_path, original_path).await {
            return Err(match &backup {
                Some(backup) => RecoveryError::partial_failure(
                    original_path,
                    OperationStep::Backup,
                    OperationStep::CopyVersion,
                    format!("{}; previous content is in '{}'", e, backup.display()),
                ),
                None => e,
            });
        }

        fs::remove_file(version_path).await.map_err(|e| {
            RecoveryError::partial_failure(
                version_path,
                OperationStep::CopyVersion,
                OperationStep::RemoveVersion,
                e.to_string(),
            )
        })?;

        tracing::info!(
            version = %version_path.display(),
            original = %original_path.display(),
            backup = backup.is_some(),
            "Restored version"
        );

        Ok(RestoreReport {
            restored: original_path.to_path_buf(),
            backup,
            consumed_version: version_path.to_path_buf(),
        })
    }

    /// Restore a listed version to the path it was taken from
    pub async fn restore_version(&self, version: &VersionedFile) -> Result<RestoreReport> {
        self.restore(&version.version_path, &version.original_path).await
    }

    /// Move `path` into the version subtree of `root`
    ///
    /// The artifact is named with the current local time at second
    /// resolution; a second archive of the same file within that second
    /// overwrites the first.
    pub async fn archive<P1: AsRef<Path>, P2: AsRef<Path>>(&self, path: P1, root: P2) -> Result<PathBuf> {
        let path = path.as_ref();
        let root = root.as_ref();

        let metadata = fs::metadata(path)
            .await
            .map_err(|e| RecoveryError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(RecoveryError::invalid_artifact(path, "only regular files can be archived"));
        }

        let now = Local::now();
        let timestamp = now.with_nanosecond(0).unwrap_or(now);
        let destination = naming::version_path_for(root, path, &timestamp).ok_or_else(|| {
            RecoveryError::invalid_artifact(path, format!("not inside '{}'", root.display()))
        })?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RecoveryError::from_io(parent, e))?;
        }

        if fs::metadata(&destination).await.is_ok() {
            tracing::warn!(path = %destination.display(), "Version artifact already exists, overwriting");
        }

        preservation::copy_file(path, &destination).await?;
        fs::remove_file(path).await.map_err(|e| {
            RecoveryError::partial_failure(
                path,
                OperationStep::CopySource,
                OperationStep::RemoveSource,
                e.to_string(),
            )
        })?;

        tracing::info!(path = %path.display(), version = %destination.display(), "Archived file");
        Ok(destination)
    }

    /// Permanently delete one version artifact
    pub async fn delete_version<P: AsRef<Path>>(&self, version_path: P) -> Result<()> {
        let version_path = version_path.as_ref();
        validate_version_name(version_path)?;

        fs::remove_file(version_path)
            .await
            .map_err(|e| RecoveryError::from_io(version_path, e))?;
        tracing::info!(path = %version_path.display(), "Deleted version");
        Ok(())
    }

    /// Keep the newest `keep_latest` versions of every file, delete the rest
    ///
    /// Stops at the first failed delete.
    pub async fn prune<P: AsRef<Path>>(&self, root: P, keep_latest: usize) -> Result<Vec<PathBuf>> {
        let versions = self.list_versions(root).await?;
        let mut removed = Vec::new();

        for (_, group) in group_by_original(versions) {
            for version in group.into_iter().skip(keep_latest) {
                self.delete_version(&version.version_path).await?;
                removed.push(version.version_path);
            }
        }

        Ok(removed)
    }
}

/// Group versions by the file they belong to, each group newest first
pub fn group_by_original(versions: Vec<VersionedFile>) -> BTreeMap<PathBuf, Vec<VersionedFile>> {
    let mut groups: BTreeMap<PathBuf, Vec<VersionedFile>> = BTreeMap::new();
    for version in versions {
        groups
            .entry(version.original_path.clone())
            .or_default()
            .push(version);
    }
    for group in groups.values_mut() {
        sort_newest_first(group);
    }
    groups
}

fn sort_newest_first(versions: &mut [VersionedFile]) {
    versions.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.version_path.cmp(&b.version_path))
    });
}

fn validate_version_name(version_path: &Path) -> Result<()> {
    version_path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(naming::parse_version_name)
        .map(|_| ())
        .ok_or_else(|| RecoveryError::invalid_artifact(version_path, "name does not match the version pattern"))
}

/// Copy an existing regular file to `<original>.backup`, best effort
async fn backup_original(original_path: &Path) -> Option<PathBuf> {
    match fs::metadata(original_path).await {
        Ok(metadata) if metadata.is_file() => {}
        _ => return None,
    }

    let mut backup = original_path.as_os_str().to_owned();
    backup.push(BACKUP_SUFFIX);
    let backup = PathBuf::from(backup);

    match preservation::copy_file(original_path, &backup).await {
        Ok(_) => Some(backup),
        Err(e) => {
            tracing::warn!(path = %original_path.display(), error = %e, "Backup before restore failed");
            None
        }
    }
}
