//! Content-identity grouping of files using BLAKE3 digests
//!
//! Digests are used for equality only. Files are hashed with bounded
//! concurrency; results are merged by a single writer in scan order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::error::{OperationStep, RecoveryError, Result};
use crate::filter::FileFilter;
use crate::scanner::{DirectoryScanner, FileEntry, ScanOptions};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Files sharing one content digest, in scan order
///
/// The first entry is the conventional keeper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub digest: String,
    pub size: u64,
    pub entries: Vec<FileEntry>,
}

impl DuplicateGroup {
    pub fn keeper(&self) -> Option<&FileEntry> {
        self.entries.first()
    }

    /// Space that removing every non-keeper would free
    pub fn reclaimable_bytes(&self) -> u64 {
        self.size * (self.entries.len() as u64).saturating_sub(1)
    }
}

/// Options for duplicate discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateOptions {
    /// Extensions considered content-bearing; empty means every file
    pub extensions: Vec<String>,
    /// Files smaller than this are ignored
    pub min_size: Option<u64>,
    /// Files hashed at once
    pub max_concurrency: usize,
    /// Options for the underlying scan
    pub scan: ScanOptions,
}

impl Default for DuplicateOptions {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            min_size: None,
            max_concurrency: 4,
            scan: ScanOptions::default(),
        }
    }
}

/// Groups files by content digest
#[derive(Debug, Clone, Default)]
pub struct DuplicateIndex {
    options: DuplicateOptions,
    cancel: Option<CancellationToken>,
}

impl DuplicateIndex {
    pub fn new(options: DuplicateOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stream a file through BLAKE3 and return the hex digest
    pub async fn hash_file<P: AsRef<Path>>(&self, path: P) -> Result<String> {
        let path = path.as_ref();
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| RecoveryError::hash_error(path, format!("Failed to open file: {}", e)))?;

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; HASH_BUFFER_SIZE];

        loop {
            if self.is_cancelled() {
                return Err(RecoveryError::Cancelled);
            }

            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| RecoveryError::hash_error(path, format!("Failed to read file: {}", e)))?;

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Map of digest to files for every digest shared by two or more files
    ///
    /// Files that cannot be hashed are left out. Only cancellation fails
    /// the batch.
    pub async fn find_duplicates(&self, entries: Vec<FileEntry>) -> Result<HashMap<String, Vec<FileEntry>>> {
        Ok(self
            .group_entries(entries)
            .await?
            .into_iter()
            .map(|group| (group.digest, group.entries))
            .collect())
    }

    /// Scan `root` and return its duplicate groups in order of first appearance
    pub async fn find_duplicate_groups<P: AsRef<Path>>(&self, root: P) -> Result<Vec<DuplicateGroup>> {
        let mut scanner = DirectoryScanner::new(self.options.scan.clone())?;
        if !self.options.extensions.is_empty() {
            scanner = scanner.with_filter(FileFilter::by_extensions(&self.options.extensions, false)?);
        }
        if let Some(token) = &self.cancel {
            scanner = scanner.with_cancellation(token.clone());
        }

        let entries = scanner.scan(root).await?;
        self.group_entries(entries).await
    }

    /// Delete every member of `group` except the keeper
    ///
    /// Each file is re-hashed right before deletion; a member whose content
    /// no longer matches stops the operation. A failure after at least one
    /// deletion is a [`RecoveryError::PartialFailure`] listing what was removed.
    pub async fn remove_duplicates(&self, group: &DuplicateGroup) -> Result<Vec<PathBuf>> {
        let keeper = group
            .keeper()
            .ok_or_else(|| RecoveryError::invalid_artifact(PathBuf::new(), "empty duplicate group"))?;
        self.verify_digest(&keeper.path, &group.digest).await?;

        let mut removed: Vec<PathBuf> = Vec::new();
        for entry in group.entries.iter().skip(1) {
            if let Err(e) = self.verify_digest(&entry.path, &group.digest).await {
                return Err(stopped_after(removed, &entry.path, OperationStep::VerifyDuplicate, e));
            }
            if let Err(e) = fs::remove_file(&entry.path).await {
                let e = RecoveryError::from_io(&entry.path, e);
                return Err(stopped_after(removed, &entry.path, OperationStep::RemoveDuplicate, e));
            }
            tracing::info!(
                path = %entry.path.display(),
                keeper = %keeper.path.display(),
                "Removed duplicate"
            );
            removed.push(entry.path.clone());
        }

        Ok(removed)
    }

    async fn verify_digest(&self, path: &Path, expected: &str) -> Result<()> {
        let digest = match self.hash_file(path).await {
            Ok(digest) => digest,
            Err(e) => {
                if matches!(e, RecoveryError::Hash { .. }) && fs::metadata(path).await.is_err() {
                    return Err(RecoveryError::not_found(path));
                }
                return Err(e);
            }
        };

        if digest != expected {
            return Err(RecoveryError::invalid_artifact(path, "content changed since it was indexed"));
        }
        Ok(())
    }

    async fn group_entries(&self, entries: Vec<FileEntry>) -> Result<Vec<DuplicateGroup>> {
        let candidates = self.size_candidates(entries);
        let concurrency = self.options.max_concurrency.max(1);

        let hashed = stream::iter(candidates)
            .map(|entry| async move {
                let digest = self.hash_file(&entry.path).await;
                (entry, digest)
            })
            .buffered(concurrency);
        futures::pin_mut!(hashed);

        let mut order: Vec<String> = Vec::new();
        let mut by_digest: HashMap<String, Vec<FileEntry>> = HashMap::new();

        while let Some((entry, digest)) = hashed.next().await {
            let digest = match digest {
                Ok(digest) => digest,
                Err(RecoveryError::Cancelled) => return Err(RecoveryError::Cancelled),
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Skipping unhashable file");
                    continue;
                }
            };

            let members = by_digest.entry(digest.clone()).or_insert_with(|| {
                order.push(digest);
                Vec::new()
            });
            members.push(entry);
        }

        let groups: Vec<DuplicateGroup> = order
            .into_iter()
            .filter_map(|digest| {
                let entries = by_digest.remove(&digest)?;
                if entries.len() < 2 {
                    return None;
                }
                Some(DuplicateGroup {
                    size: entries[0].size,
                    digest,
                    entries,
                })
            })
            .collect();

        tracing::debug!(groups = groups.len(), "Duplicate grouping finished");
        Ok(groups)
    }

    /// Files whose size is shared with at least one other file, in input order
    fn size_candidates(&self, entries: Vec<FileEntry>) -> Vec<FileEntry> {
        let min_size = self.options.min_size.unwrap_or(0);
        let entries: Vec<FileEntry> = entries
            .into_iter()
            .filter(|entry| !entry.is_dir && entry.size >= min_size)
            .collect();

        let mut size_counts: HashMap<u64, usize> = HashMap::new();
        for entry in &entries {
            *size_counts.entry(entry.size).or_default() += 1;
        }

        entries
            .into_iter()
            .filter(|entry| size_counts.get(&entry.size).copied().unwrap_or(0) > 1)
            .collect()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|token| token.is_cancelled()).unwrap_or(false)
    }
}

/// Turn a failure part way through a dedup into a partial failure, unless
/// nothing had been removed yet
fn stopped_after(removed: Vec<PathBuf>, path: &Path, failed: OperationStep, err: RecoveryError) -> RecoveryError {
    if removed.is_empty() {
        return err;
    }

    let listed: Vec<String> = removed.iter().map(|p| p.display().to_string()).collect();
    RecoveryError::partial_failure(
        path,
        OperationStep::RemoveDuplicate,
        failed,
        format!("{}; already removed: {}", err, listed.join(", ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_hash_is_deterministic_and_content_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.bin");
        let b = temp_dir.path().join("b.bin");
        fs::write(&a, b"identical bytes").await.unwrap();
        fs::write(&b, b"identical bytez").await.unwrap();

        let index = DuplicateIndex::default();
        let first = index.hash_file(&a).await.unwrap();
        let second = index.hash_file(&a).await.unwrap();
        let other = index.hash_file(&b).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_single_group_of_two() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("one.jpg"), b"same content").await.unwrap();
        fs::write(root.join("two.jpg"), b"same content").await.unwrap();
        fs::write(root.join("three.jpg"), b"different!!!").await.unwrap();

        let groups = DuplicateIndex::default().find_duplicate_groups(root).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entries.len(), 2);
        assert!(groups[0].entries.iter().all(|e| e.name != "three.jpg"));
        assert_eq!(groups[0].reclaimable_bytes(), 12);
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_excluded() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("one.txt"), b"dup").await.unwrap();
        fs::write(root.join("two.txt"), b"dup").await.unwrap();

        let scanner = DirectoryScanner::new(ScanOptions::default()).unwrap();
        let mut entries = scanner.scan(root).await.unwrap();
        let mut ghost = entries[0].clone();
        ghost.path = root.join("vanished.txt");
        ghost.name = "vanished.txt".to_string();
        entries.push(ghost);

        let duplicates = DuplicateIndex::default().find_duplicates(entries).await.unwrap();

        assert_eq!(duplicates.len(), 1);
        let members = duplicates.values().next().unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().all(|e| e.name != "vanished.txt"));
    }

    #[tokio::test]
    async fn test_extension_filter_limits_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.jpg"), b"pixels").await.unwrap();
        fs::write(root.join("b.txt"), b"pixels").await.unwrap();

        let index = DuplicateIndex::new(DuplicateOptions {
            extensions: vec!["jpg".to_string()],
            ..Default::default()
        });

        assert!(index.find_duplicate_groups(root).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_duplicates_keeps_first() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"copy").await.unwrap();
        fs::write(root.join("b.txt"), b"copy").await.unwrap();

        let index = DuplicateIndex::default();
        let groups = index.find_duplicate_groups(root).await.unwrap();
        let keeper = groups[0].keeper().unwrap().path.clone();

        let removed = index.remove_duplicates(&groups[0]).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert!(keeper.exists());
        assert!(!removed[0].exists());
    }

    #[tokio::test]
    async fn test_remove_duplicates_refuses_changed_member() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"copy").await.unwrap();
        fs::write(root.join("b.txt"), b"copy").await.unwrap();

        let index = DuplicateIndex::default();
        let groups = index.find_duplicate_groups(root).await.unwrap();
        let other = groups[0].entries[1].path.clone();
        fs::write(&other, b"edit").await.unwrap();

        let err = index.remove_duplicates(&groups[0]).await.unwrap_err();

        assert!(matches!(err, RecoveryError::InvalidArtifact { .. }));
        assert!(other.exists());
    }

    #[tokio::test]
    async fn test_failure_after_removal_lists_removed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), b"copy").await.unwrap();
        fs::write(root.join("b.txt"), b"copy").await.unwrap();
        fs::write(root.join("c.txt"), b"copy").await.unwrap();

        let index = DuplicateIndex::default();
        let group = index.find_duplicate_groups(root).await.unwrap().remove(0);
        let second = group.entries[1].path.clone();
        let third = group.entries[2].path.clone();
        fs::write(&third, b"edit").await.unwrap();

        let err = index.remove_duplicates(&group).await.unwrap_err();

        match err {
            RecoveryError::PartialFailure { path, completed, failed, message } => {
                assert_eq!(path, third);
                assert_eq!(completed, OperationStep::RemoveDuplicate);
                assert_eq!(failed, OperationStep::VerifyDuplicate);
                assert!(message.contains(&second.display().to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!second.exists());
        assert!(third.exists());
    }

    #[test]
    fn test_empty_group_has_no_keeper() {
        let group = DuplicateGroup {
            digest: String::new(),
            size: 10,
            entries: Vec::new(),
        };

        assert!(group.keeper().is_none());
        assert_eq!(group.reclaimable_bytes(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_hashing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.bin");
        fs::write(&path, b"data").await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let index = DuplicateIndex::default().with_cancellation(token);

        assert!(matches!(index.hash_file(&path).await, Err(RecoveryError::Cancelled)));
    }
}
