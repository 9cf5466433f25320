//! Artifact Recovery Library
//!
//! Inspects a folder maintained by an external sync daemon and recovers
//! higher-level facts from its on-disk conventions:
//! - Sync-conflict copies, resolved by discarding or promoting them
//! - Archived versions under `.stversions`, restored with a safety backup
//! - Content duplicates grouped by digest
//! - Ignore patterns merged from VCS and sidecar ignore files
//!
//! Every operation is independent and stateless; mutations are explicit
//! calls, never side effects of scanning.

pub mod naming;
pub mod filter;
pub mod scanner;
pub mod preservation;
pub mod conflict;
pub mod versions;
pub mod duplicates;
pub mod ignore_rules;
pub mod error;

use std::path::Path;

// Re-export main types and functions
pub use scanner::{DirectoryScanner, FileEntry, ScanOptions, ScanOutcome, SkipReason};
pub use filter::{FileFilter, FilterOptions};
pub use conflict::{ConflictArtifact, ConflictResolution, ConflictResolver, ConflictStrategy, ConflictType};
pub use versions::{group_by_original, RestoreReport, VersionStore, VersionedFile};
pub use duplicates::{DuplicateGroup, DuplicateIndex, DuplicateOptions};
pub use ignore_rules::{ApplySummary, IgnorePattern, IgnoreRuleEngine, ImportSummary, PatternSource};
pub use error::{OperationStep, RecoveryError, Result};

/// List one directory level, directories first
pub async fn list_directory(path: impl AsRef<Path>) -> Result<Vec<FileEntry>> {
    scanner::list_directory(path, &ScanOptions::default()).await
}

/// Find every sync-conflict copy under `root`
pub async fn scan_conflicts(root: impl AsRef<Path>) -> Result<Vec<ConflictArtifact>> {
    ConflictResolver::default().find_conflicts(root).await
}

/// Discard or promote the conflict copy at `path`
pub async fn resolve_conflict(
    path: impl AsRef<Path>,
    strategy: ConflictStrategy,
) -> Result<ConflictResolution> {
    ConflictResolver::default().resolve(path, strategy).await
}

/// List every version artifact under `root`, newest first
pub async fn list_versions(root: impl AsRef<Path>) -> Result<Vec<VersionedFile>> {
    VersionStore::new().list_versions(root).await
}

/// Restore a version artifact over `original_path`
pub async fn restore_version(
    version_path: impl AsRef<Path>,
    original_path: impl AsRef<Path>,
) -> Result<RestoreReport> {
    VersionStore::new().restore(version_path, original_path).await
}

/// Move `path` into the version subtree of `root` instead of deleting it
pub async fn archive_before_delete(
    path: impl AsRef<Path>,
    root: impl AsRef<Path>,
) -> Result<std::path::PathBuf> {
    VersionStore::new().archive(path, root).await
}

/// Group the files under `root` by content
pub async fn find_duplicates(root: impl AsRef<Path>) -> Result<Vec<DuplicateGroup>> {
    DuplicateIndex::default().find_duplicate_groups(root).await
}

/// Merge the VCS ignore file of `root` into its sidecar ignore file
pub async fn import_external_ignores(root: impl AsRef<Path>) -> Result<ImportSummary> {
    IgnoreRuleEngine::new().import_external(root).await
}

/// Merge `patterns` into the sidecar ignore file of `root`
pub async fn apply_ignore_patterns(root: impl AsRef<Path>, patterns: &[String]) -> Result<ApplySummary> {
    IgnoreRuleEngine::new().apply_patterns(root, patterns).await
}

// Test modules
#[cfg(test)]
mod naming_tests;
