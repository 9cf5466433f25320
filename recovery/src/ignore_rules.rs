//! Loading, merging and persisting exclusion patterns
//!
//! Patterns come from a VCS ignore file (`#` comments), the daemon's own
//! sidecar ignore file (`//` comments) or the caller. Only the merged,
//! de-duplicated set is written back, to the sidecar file.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{RecoveryError, Result};
use crate::filter::FileFilter;

/// VCS ignore file imported from
pub const EXTERNAL_IGNORE_FILE: &str = ".gitignore";

/// The daemon's sidecar ignore file
pub const LOCAL_IGNORE_FILE: &str = ".stignore";

/// Banner written at the top of the sidecar file
pub const IGNORE_FILE_HEADER: &str = "// Ignore patterns maintained by the recovery engine.\n// One pattern per line; lines starting with // are comments.";

/// Where a pattern was read from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    External,
    Local,
    User,
}

/// A pattern tagged with its source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnorePattern {
    pub pattern: String,
    pub source: PatternSource,
}

/// Counts reported by [`IgnoreRuleEngine::import_external`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub total: usize,
}

/// Counts reported by [`IgnoreRuleEngine::apply_patterns`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplySummary {
    pub applied: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct IgnoreRuleEngine {
    external_file: String,
    local_file: String,
}

impl Default for IgnoreRuleEngine {
    fn default() -> Self {
        Self {
            external_file: EXTERNAL_IGNORE_FILE.to_string(),
            local_file: LOCAL_IGNORE_FILE.to_string(),
        }
    }
}

impl IgnoreRuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use different file names for the external and sidecar files
    pub fn with_files(external_file: impl Into<String>, local_file: impl Into<String>) -> Self {
        Self {
            external_file: external_file.into(),
            local_file: local_file.into(),
        }
    }

    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(&self.local_file)
    }

    /// Patterns from the VCS ignore file; negations are dropped
    pub async fn load_external<P: AsRef<Path>>(&self, root: P) -> Result<Vec<String>> {
        let path = root.as_ref().join(&self.external_file);
        let content = read_optional(&path).await?;
        Ok(parse_patterns(&content, "#"))
    }

    /// Patterns from the sidecar ignore file
    pub async fn load_local<P: AsRef<Path>>(&self, root: P) -> Result<Vec<String>> {
        let path = root.as_ref().join(&self.local_file);
        let content = read_optional(&path).await?;
        Ok(parse_patterns(&content, "//"))
    }

    /// Both files' patterns with their provenance, before any merge
    pub async fn load_tagged<P: AsRef<Path>>(&self, root: P) -> Result<Vec<IgnorePattern>> {
        let root = root.as_ref();
        let external = self.load_external(root).await?.into_iter().map(|pattern| IgnorePattern {
            pattern,
            source: PatternSource::External,
        });
        let local = self.load_local(root).await?.into_iter().map(|pattern| IgnorePattern {
            pattern,
            source: PatternSource::Local,
        });
        Ok(external.chain(local).collect())
    }

    /// Union `new_patterns` into the sidecar file and persist it
    ///
    /// Existing patterns keep their position; new ones are appended once.
    pub async fn merge<P: AsRef<Path>>(&self, root: P, new_patterns: &[String]) -> Result<Vec<String>> {
        let root = root.as_ref();
        let mut combined = self.load_local(root).await?;

        for pattern in clean_patterns(new_patterns) {
            if !combined.contains(&pattern) {
                combined.push(pattern);
            }
        }

        self.persist(root, &combined).await?;
        Ok(combined)
    }

    /// Merge the VCS ignore file into the sidecar file
    pub async fn import_external<P: AsRef<Path>>(&self, root: P) -> Result<ImportSummary> {
        let root = root.as_ref();
        let external = self.load_external(root).await?;
        let combined = self.merge(root, &external).await?;

        Ok(ImportSummary {
            imported: external.len(),
            total: combined.len(),
        })
    }

    /// Merge caller-chosen patterns into the sidecar file
    pub async fn apply_patterns<P: AsRef<Path>>(&self, root: P, patterns: &[String]) -> Result<ApplySummary> {
        let cleaned = clean_patterns(patterns);
        let combined = self.merge(root, &cleaned).await?;

        Ok(ApplySummary {
            applied: cleaned.len(),
            total: combined.len(),
        })
    }

    /// Scan filter excluding everything the sidecar file lists
    pub async fn matcher<P: AsRef<Path>>(&self, root: P) -> Result<FileFilter> {
        let patterns = self.load_local(root).await?;
        FileFilter::excluding(&patterns)
    }

    async fn persist(&self, root: &Path, patterns: &[String]) -> Result<()> {
        let path = self.local_path(root);
        let mut content = String::from(IGNORE_FILE_HEADER);
        content.push('\n');
        for pattern in patterns {
            content.push_str(pattern);
            content.push('\n');
        }

        let staging = root.join(format!("{}.tmp", self.local_file));
        fs::write(&staging, content)
            .await
            .map_err(|e| RecoveryError::ignore_file_error(&staging, e.to_string()))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| RecoveryError::ignore_file_error(&path, e.to_string()))?;

        tracing::info!(path = %path.display(), patterns = patterns.len(), "Wrote ignore file");
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(RecoveryError::ignore_file_error(path, e.to_string())),
    }
}

/// One pattern per line: trimmed, blanks and comments dropped, negations
/// dropped, first occurrence kept
fn parse_patterns(content: &str, comment_marker: &str) -> Vec<String> {
    let lines: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(comment_marker))
        .map(str::to_string)
        .collect();
    clean_patterns(&lines)
}

fn clean_patterns(patterns: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        if pattern.starts_with('!') {
            tracing::debug!(pattern, "Dropping negated ignore pattern");
            continue;
        }
        if !cleaned.iter().any(|existing| existing == pattern) {
            cleaned.push(pattern.to_string());
        }
    }
    cleaned
}
