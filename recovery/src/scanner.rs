//! Directory scanning functionality using walkdir and tokio::fs
//!
//! Two flavors: [`DirectoryScanner::scan`] walks a tree depth-first and
//! [`list_directory`] lists one level for interactive browsing. Neither
//! aborts on a single bad entry or unreadable subtree; those become
//! [`ScanOutcome::Skipped`] and are logged.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{RecoveryError, Result};
use crate::filter::FileFilter;

/// Entry names that are never descended into or reported
pub const BUILTIN_EXCLUDES: &[&str] = &[".stfolder", ".git", "node_modules", "__pycache__"];

/// Options for directory scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Follow symbolic links
    pub follow_links: bool,
    /// Maximum recursion depth below the root (None for unlimited)
    pub max_depth: Option<usize>,
    /// Skip every dotfile and dot-directory
    pub skip_hidden: bool,
    /// Report directories as well as files
    pub include_dirs: bool,
    /// Ignore-style patterns excluded from the walk, relative to the root
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            max_depth: None,
            skip_hidden: false,
            include_dirs: false,
            exclude_patterns: Vec::new(),
        }
    }
}

/// File entry with metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// Relative path from the scan root
    pub relative_path: PathBuf,
    /// Base name
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
    /// File size in bytes
    pub size: u64,
    /// Last modified time
    pub modified: SystemTime,
}

/// Why a scanned path was left out of the results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// stat() on the entry failed
    Metadata(String),
    /// A directory could not be read; its subtree is treated as empty
    Traversal(String),
}

/// Result of visiting one path during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    Entry(FileEntry),
    Skipped { path: PathBuf, reason: SkipReason },
}

impl ScanOutcome {
    pub fn into_entry(self) -> Option<FileEntry> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Skipped { .. } => None,
        }
    }
}

/// Recursive directory scanner
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    options: ScanOptions,
    filters: Vec<FileFilter>,
    cancel: Option<CancellationToken>,
}

impl DirectoryScanner {
    /// Create a new directory scanner with options
    pub fn new(options: ScanOptions) -> Result<Self> {
        let filters = if options.exclude_patterns.is_empty() {
            Vec::new()
        } else {
            vec![FileFilter::excluding(&options.exclude_patterns)?]
        };

        Ok(Self {
            options,
            filters,
            cancel: None,
        })
    }

    /// Add a filter; its excludes prune directories and its includes and
    /// size limits apply to files
    pub fn with_filter(mut self, filter: FileFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Stop the walk with [`RecoveryError::Cancelled`] once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Scan a directory and return the entries that survived filtering
    pub async fn scan<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<FileEntry>> {
        let outcomes = self.scan_outcomes(root_path).await?;
        Ok(outcomes.into_iter().filter_map(ScanOutcome::into_entry).collect())
    }

    /// Scan a directory, keeping a record of every skipped path
    pub async fn scan_outcomes<P: AsRef<Path>>(&self, root_path: P) -> Result<Vec<ScanOutcome>> {
        let root_path = root_path.as_ref().to_path_buf();

        let metadata = fs::metadata(&root_path)
            .await
            .map_err(|e| RecoveryError::from_io(&root_path, e))?;
        if !metadata.is_dir() {
            return Err(RecoveryError::scan_error(&root_path, "Path is not a directory"));
        }

        let scanner = self.clone();
        let task_root = root_path.clone();
        tokio::task::spawn_blocking(move || scanner.walk(&task_root))
            .await
            .map_err(|e| RecoveryError::scan_error(&root_path, format!("Scan task failed: {}", e)))?
    }

    fn walk(&self, root_path: &Path) -> Result<Vec<ScanOutcome>> {
        let mut builder = WalkDir::new(root_path)
            .follow_links(self.options.follow_links)
            .min_depth(1);

        if let Some(max_depth) = self.options.max_depth {
            builder = builder.max_depth(max_depth);
        }

        let mut outcomes = Vec::new();
        let walk = builder
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_pruned(root_path, entry.path()));

        for entry in walk {
            if self.is_cancelled() {
                return Err(RecoveryError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().unwrap_or(root_path).to_path_buf();
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable subtree");
                    outcomes.push(ScanOutcome::Skipped {
                        path,
                        reason: SkipReason::Traversal(e.to_string()),
                    });
                    continue;
                }
            };

            let is_dir = entry.file_type().is_dir();
            if is_dir && !self.options.include_dirs {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping entry without metadata");
                    outcomes.push(ScanOutcome::Skipped {
                        path: entry.path().to_path_buf(),
                        reason: SkipReason::Metadata(e.to_string()),
                    });
                    continue;
                }
            };

            let file_entry = create_file_entry(entry.path(), root_path, &metadata);
            if !is_dir && !self.accepts_file(&file_entry) {
                continue;
            }
            outcomes.push(ScanOutcome::Entry(file_entry));
        }

        Ok(outcomes)
    }

    fn is_pruned(&self, root_path: &Path, path: &Path) -> bool {
        let name = match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => name,
            None => return false,
        };

        if BUILTIN_EXCLUDES.contains(&name) {
            return true;
        }
        if self.options.skip_hidden && name.starts_with('.') {
            return true;
        }

        let relative = path.strip_prefix(root_path).unwrap_or(path);
        self.filters.iter().any(|filter| filter.is_excluded(relative))
    }

    fn accepts_file(&self, entry: &FileEntry) -> bool {
        self.filters
            .iter()
            .all(|filter| filter.should_include_file(&entry.relative_path, entry.size))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|token| token.is_cancelled()).unwrap_or(false)
    }
}

/// List a single directory level, directories first, then by name
///
/// Entries whose metadata cannot be read are omitted. Exclude patterns are
/// matched against the entry name, as if `path` were the scan root.
pub async fn list_directory<P: AsRef<Path>>(path: P, options: &ScanOptions) -> Result<Vec<FileEntry>> {
    let path = path.as_ref();
    let filter = if options.exclude_patterns.is_empty() {
        None
    } else {
        Some(FileFilter::excluding(&options.exclude_patterns)?)
    };
    let mut read_dir = fs::read_dir(path)
        .await
        .map_err(|e| RecoveryError::from_io(path, e))?;

    let mut entries = Vec::new();
    while let Some(dir_entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| RecoveryError::scan_error(path, format!("Failed to read entry: {}", e)))?
    {
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        if BUILTIN_EXCLUDES.contains(&name.as_str()) {
            continue;
        }
        if options.skip_hidden && name.starts_with('.') {
            continue;
        }
        if filter.as_ref().is_some_and(|filter| filter.is_excluded(Path::new(&name))) {
            continue;
        }

        let entry_path = dir_entry.path();
        match fs::metadata(&entry_path).await {
            Ok(metadata) => entries.push(create_file_entry(&entry_path, path, &metadata)),
            Err(e) => {
                tracing::debug!(path = %entry_path.display(), error = %e, "Skipping entry without metadata");
            }
        }
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

fn create_file_entry(path: &Path, root_path: &Path, metadata: &std::fs::Metadata) -> FileEntry {
    FileEntry {
        path: path.to_path_buf(),
        relative_path: path.strip_prefix(root_path).unwrap_or(path).to_path_buf(),
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}
