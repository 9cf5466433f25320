//! Path filtering with ignore-style glob patterns using globset
//!
//! A pattern without a `/` matches the entry's base name at any depth.
//! A pattern containing a `/` is matched against the path relative to the
//! scan root; a leading `/` only anchors it. A trailing `/` is dropped.
//! `*` matches leading dots, so dotfiles are never special-cased here.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, Result};

/// File filter options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Patterns to include (if empty, include all)
    pub include_patterns: Vec<String>,
    /// Patterns to exclude
    pub exclude_patterns: Vec<String>,
    /// Case sensitive matching
    pub case_sensitive: bool,
    /// Include hidden files (starting with .)
    pub include_hidden: bool,
    /// Maximum file size in bytes (None for no limit)
    pub max_file_size: Option<u64>,
    /// Minimum file size in bytes
    pub min_file_size: Option<u64>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            case_sensitive: true,
            include_hidden: true,
            max_file_size: None,
            min_file_size: None,
        }
    }
}

/// Compiled patterns split by what they are matched against
#[derive(Debug, Clone)]
struct PatternSet {
    base_names: GlobSet,
    paths: GlobSet,
}

impl PatternSet {
    fn build(patterns: &[String], case_sensitive: bool) -> Result<Self> {
        let mut base_names = GlobSetBuilder::new();
        let mut paths = GlobSetBuilder::new();

        for raw in patterns {
            let (pattern, case_insensitive) = normalize_pattern(raw)?;
            if pattern.is_empty() {
                continue;
            }

            let glob = GlobBuilder::new(&pattern)
                .case_insensitive(case_insensitive || !case_sensitive)
                .literal_separator(pattern.contains('/'))
                .build()
                .map_err(|e| {
                    RecoveryError::FilterPattern(format!("Failed to compile glob '{}': {}", raw, e))
                })?;

            if pattern.contains('/') {
                paths.add(glob);
            } else {
                base_names.add(glob);
            }
        }

        let base_names = base_names.build().map_err(|e| {
            RecoveryError::FilterPattern(format!("Failed to build globset: {}", e))
        })?;
        let paths = paths.build().map_err(|e| {
            RecoveryError::FilterPattern(format!("Failed to build globset: {}", e))
        })?;

        Ok(Self { base_names, paths })
    }

    fn is_match(&self, relative_path: &Path) -> bool {
        if let Some(name) = relative_path.file_name() {
            if self.base_names.is_match(name) {
                return true;
            }
        }
        self.paths.is_match(relative_path)
    }
}

/// Strip the daemon-specific prefixes and the anchoring/trailing slashes.
///
/// Returns the bare glob and whether `(?i)` asked for case folding.
fn normalize_pattern(raw: &str) -> Result<(String, bool)> {
    let mut pattern = raw.trim();
    let mut case_insensitive = false;

    loop {
        if let Some(rest) = pattern.strip_prefix("(?d)") {
            pattern = rest;
        } else if let Some(rest) = pattern.strip_prefix("(?i)") {
            pattern = rest;
            case_insensitive = true;
        } else {
            break;
        }
    }

    if pattern.starts_with('!') {
        return Err(RecoveryError::FilterPattern(format!(
            "Negated pattern '{}' is not supported",
            raw
        )));
    }

    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    Ok((pattern.to_string(), case_insensitive))
}

/// File filter using globset patterns
#[derive(Debug, Clone)]
pub struct FileFilter {
    include_set: Option<PatternSet>,
    exclude_set: Option<PatternSet>,
    options: FilterOptions,
}

impl FileFilter {
    /// Create a new file filter with the given options
    pub fn new(options: FilterOptions) -> Result<Self> {
        let include_set = if options.include_patterns.is_empty() {
            None
        } else {
            Some(PatternSet::build(&options.include_patterns, options.case_sensitive)?)
        };

        let exclude_set = if options.exclude_patterns.is_empty() {
            None
        } else {
            Some(PatternSet::build(&options.exclude_patterns, options.case_sensitive)?)
        };

        Ok(Self {
            include_set,
            exclude_set,
            options,
        })
    }

    /// Filter that only excludes the given patterns
    pub fn excluding(patterns: &[String]) -> Result<Self> {
        Self::new(FilterOptions {
            exclude_patterns: patterns.to_vec(),
            ..Default::default()
        })
    }

    /// Whether an entry (file or directory) at `relative_path` is excluded
    pub fn is_excluded(&self, relative_path: &Path) -> bool {
        if !self.options.include_hidden && is_hidden(relative_path) {
            return true;
        }

        self.exclude_set
            .as_ref()
            .map(|set| set.is_match(relative_path))
            .unwrap_or(false)
    }

    /// Check if a file should be included based on the filter rules
    pub fn should_include(&self, relative_path: &Path) -> bool {
        if self.is_excluded(relative_path) {
            return false;
        }

        if let Some(include_set) = &self.include_set {
            if !include_set.is_match(relative_path) {
                return false;
            }
        }

        true
    }

    /// Check if a file should be included based on size constraints
    pub fn should_include_size(&self, file_size: u64) -> bool {
        if let Some(max_size) = self.options.max_file_size {
            if file_size > max_size {
                return false;
            }
        }

        if let Some(min_size) = self.options.min_file_size {
            if file_size < min_size {
                return false;
            }
        }

        true
    }

    /// Comprehensive check including both path and size filters
    pub fn should_include_file(&self, relative_path: &Path, file_size: u64) -> bool {
        self.should_include(relative_path) && self.should_include_size(file_size)
    }

    /// Get the filter options
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Create a filter that includes only specific file extensions
    pub fn by_extensions(extensions: &[String], case_sensitive: bool) -> Result<Self> {
        let patterns = extensions
            .iter()
            .map(|ext| format!("*.{}", ext.trim_start_matches('.')))
            .collect();

        let options = FilterOptions {
            include_patterns: patterns,
            case_sensitive,
            ..Default::default()
        };

        Self::new(options)
    }
}

/// Check if any component of a relative path is a dotfile or dot-directory
fn is_hidden(path: &Path) -> bool {
    path.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|s| s.starts_with('.') && s != "." && s != "..")
            .unwrap_or(false)
    })
}
