use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use recovery::naming;
use recovery::{
    group_by_original, ConflictResolver, ConflictStrategy, DuplicateIndex, IgnoreRuleEngine,
    ScanOptions, VersionStore,
};

mod config;
mod telemetry;

use config::RecoveryConfig;

#[derive(Parser)]
#[command(name = "recovery")]
#[command(about = "Recover conflict copies, old versions and duplicates in a synced folder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List one directory level
    Ls { path: PathBuf },
    /// Find sync-conflict copies
    Conflicts { root: PathBuf },
    /// Resolve a conflict copy
    Resolve {
        path: PathBuf,
        /// discard (keep mine) or promote (keep theirs)
        #[arg(short, long)]
        strategy: ConflictStrategy,
    },
    /// List archived versions, newest first
    Versions {
        root: PathBuf,
        /// Group by original file
        #[arg(long)]
        grouped: bool,
    },
    /// Restore an archived version
    Restore {
        version: PathBuf,
        /// Where to restore to
        #[arg(long)]
        to: Option<PathBuf>,
        /// Folder root, used to derive the original path when --to is absent
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Move a file into the version store instead of deleting it
    Archive {
        path: PathBuf,
        #[arg(long)]
        root: PathBuf,
    },
    /// Delete all but the newest versions of every file
    Prune {
        root: PathBuf,
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Find files with identical content
    Duplicates {
        root: PathBuf,
        /// Delete every copy except the first of each group
        #[arg(long)]
        delete: bool,
    },
    /// Manage ignore patterns
    Ignore {
        #[command(subcommand)]
        action: IgnoreActions,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigActions,
    },
}

#[derive(Subcommand)]
enum IgnoreActions {
    /// Merge the folder's .gitignore into its .stignore
    Import { root: PathBuf },
    /// Merge patterns into the folder's .stignore
    Apply {
        root: PathBuf,
        #[arg(required = true)]
        patterns: Vec<String>,
    },
    /// Show patterns with where they came from
    List { root: PathBuf },
}

#[derive(Subcommand)]
enum ConfigActions {
    /// Write a default configuration file
    Init {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RecoveryConfig::load_or_default(cli.config.as_deref()).await?;
    config.validate()?;
    let _guard = telemetry::init(&config.logging, cli.verbose)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            signal_token.cancel();
        }
    });

    run(cli.command, &config, cancel).await
}

async fn run(command: Commands, config: &RecoveryConfig, cancel: CancellationToken) -> Result<()> {
    match command {
        Commands::Ls { path } => {
            let entries = recovery::scanner::list_directory(&path, &config.scan_options()).await?;
            print_json(&entries)
        }
        Commands::Conflicts { root } => {
            let resolver = ConflictResolver::new(scan_options_for(&root, config).await?)
                .with_cancellation(cancel);
            let conflicts = resolver.find_conflicts(&root).await?;
            info!(root = %root.display(), count = conflicts.len(), "Found conflicts");
            print_json(&conflicts)
        }
        Commands::Resolve { path, strategy } => {
            let resolution = ConflictResolver::default()
                .resolve(&path, strategy)
                .await
                .with_context(|| format!("Failed to {} {}", strategy, path.display()))?;
            print_json(&resolution)
        }
        Commands::Versions { root, grouped } => {
            let versions = VersionStore::new()
                .with_cancellation(cancel)
                .list_versions(&root)
                .await?;
            if grouped {
                print_json(&group_by_original(versions))
            } else {
                print_json(&versions)
            }
        }
        Commands::Restore { version, to, root } => {
            let original = match (to, root) {
                (Some(to), _) => to,
                (None, Some(root)) => naming::original_path_for(&root, &version).with_context(|| {
                    format!("{} is not a version inside {}", version.display(), root.display())
                })?,
                (None, None) => anyhow::bail!("Either --to or --root is required"),
            };
            let report = VersionStore::new().restore(&version, &original).await?;
            print_json(&report)
        }
        Commands::Archive { path, root } => {
            let archived = VersionStore::new().archive(&path, &root).await?;
            print_json(&archived)
        }
        Commands::Prune { root, keep } => {
            let keep = keep.unwrap_or(config.versions.keep_latest);
            let removed = VersionStore::new()
                .with_cancellation(cancel)
                .prune(&root, keep)
                .await?;
            info!(removed = removed.len(), keep, "Pruned versions");
            print_json(&removed)
        }
        Commands::Duplicates { root, delete } => {
            let mut options = config.duplicate_options();
            options.scan = scan_options_for(&root, config).await?;
            let index = DuplicateIndex::new(options).with_cancellation(cancel);
            let groups = index.find_duplicate_groups(&root).await?;

            if delete {
                let mut removed = Vec::new();
                for group in &groups {
                    match index.remove_duplicates(group).await {
                        Ok(paths) => removed.extend(paths),
                        Err(e) => {
                            print_json(&removed)?;
                            return Err(e).context("Duplicate removal stopped");
                        }
                    }
                }
                print_json(&removed)
            } else {
                print_json(&groups)
            }
        }
        Commands::Ignore { action } => {
            let engine = IgnoreRuleEngine::new();
            match action {
                IgnoreActions::Import { root } => print_json(&engine.import_external(&root).await?),
                IgnoreActions::Apply { root, patterns } => {
                    print_json(&engine.apply_patterns(&root, &patterns).await?)
                }
                IgnoreActions::List { root } => print_json(&engine.load_tagged(&root).await?),
            }
        }
        Commands::Config { action } => match action {
            ConfigActions::Init { output, force } => {
                let path = output
                    .or_else(config::default_config_path)
                    .context("No configuration directory available, pass --output")?;
                if path.exists() && !force {
                    anyhow::bail!("{} already exists, use --force to overwrite", path.display());
                }
                RecoveryConfig::default().save(&path).await?;
                println!("{}", path.display());
                Ok(())
            }
            ConfigActions::Show => {
                println!("{}", toml::to_string_pretty(config)?);
                Ok(())
            }
        },
    }
}

/// Configured scan options plus the folder's own ignore file, if enabled
async fn scan_options_for(root: &Path, config: &RecoveryConfig) -> Result<ScanOptions> {
    let mut options = config.scan_options();
    if config.scan.use_ignore_file {
        let local = IgnoreRuleEngine::new().load_local(root).await?;
        options.exclude_patterns.extend(local);
    }
    Ok(options)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
