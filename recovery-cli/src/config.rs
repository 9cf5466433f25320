use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use recovery::{DuplicateOptions, FileFilter, ScanOptions};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecoveryConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
    #[serde(default)]
    pub versions: VersionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub skip_hidden: bool,
    #[serde(default)]
    pub follow_links: bool,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Also exclude what the folder's sidecar ignore file lists
    #[serde(default = "default_use_ignore_file")]
    pub use_ignore_file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_min_size")]
    pub min_size: Option<u64>,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsConfig {
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
            rotation: default_rotation(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_hidden: false,
            follow_links: false,
            max_depth: None,
            exclude_patterns: Vec::new(),
            use_ignore_file: default_use_ignore_file(),
        }
    }
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            min_size: default_min_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            keep_latest: default_keep_latest(),
        }
    }
}

impl RecoveryConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: RecoveryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// Explicit path must exist; the default location falls back to defaults
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path).await,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load(path).await,
                _ => Ok(Self::default()),
            },
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Unknown log level: {}", other),
        }

        match self.logging.rotation.as_str() {
            "daily" | "hourly" | "never" => {}
            other => anyhow::bail!("Unknown log rotation: {}", other),
        }

        if self.duplicates.max_concurrency == 0 {
            anyhow::bail!("duplicates.max_concurrency must be at least 1");
        }

        FileFilter::excluding(&self.scan.exclude_patterns)?;
        Ok(())
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            follow_links: self.scan.follow_links,
            max_depth: self.scan.max_depth,
            skip_hidden: self.scan.skip_hidden,
            include_dirs: false,
            exclude_patterns: self.scan.exclude_patterns.clone(),
        }
    }

    pub fn duplicate_options(&self) -> DuplicateOptions {
        DuplicateOptions {
            extensions: self.duplicates.extensions.clone(),
            min_size: self.duplicates.min_size,
            max_concurrency: self.duplicates.max_concurrency,
            scan: self.scan_options(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("recovery").join("config.toml"))
}

// Default value functions
fn default_log_level() -> String { "info".to_string() }
fn default_rotation() -> String { "daily".to_string() }
fn default_use_ignore_file() -> bool { true }
fn default_min_size() -> Option<u64> { Some(1) }
fn default_max_concurrency() -> usize { 4 }
fn default_keep_latest() -> usize { 5 }

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "heic", "webp", "mp4", "mov", "mkv", "mp3", "flac", "pdf"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}
