// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! seqrename: sequential photo renamer
//!
//! Watches a folder and renames incoming PNG images to a numbered prefix.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use seqrename::config::{self, Preferences, WatchConfig};
use seqrename::controller::{spawn_stdin_reader, Controller, ControllerOptions};
use seqrename::naming::validate_prefix;
use seqrename::scanner;

/// seqrename CLI - sequential photo renamer
#[derive(Parser, Debug)]
#[command(name = "seqrename")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Watch a folder and number incoming PNG images", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the preferences file (JSON format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a folder and rename new images as they arrive
    Watch {
        /// Folder to watch (overrides the saved one)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Prefix for new names (overrides the saved one)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Do not reorganise existing files before watching
        #[arg(long)]
        no_reorganize: bool,

        /// Quiet period after a new file appears, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },

    /// Reorganise a folder once and exit
    Organize {
        /// Folder to reorganise
        dir: PathBuf,

        /// Prefix for the names (default: the saved one)
        #[arg(short, long)]
        prefix: Option<String>,

        /// Show what would be renamed without renaming
        #[arg(long)]
        dry_run: bool,
    },

    /// Preferences management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show saved preferences
    Show,

    /// Print where preferences are stored
    Path,

    /// Restore default preferences
    Reset {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let prefs_path = cli.config.clone().unwrap_or_else(config::default_path);
    let prefs = Preferences::load(&prefs_path)
        .with_context(|| format!("Cannot read preferences at {}", prefs_path.display()))?;

    match cli.command {
        Some(Commands::Watch { dir, prefix, no_reorganize, debounce_ms }) => {
            run_watch(prefs, prefs_path, dir, prefix, no_reorganize, debounce_ms).await
        }
        Some(Commands::Organize { dir, prefix, dry_run }) => {
            run_organize(&prefs, &dir, prefix.as_deref(), dry_run)
        }
        Some(Commands::Config { action }) => run_config_command(prefs, action, &prefs_path),
        None => {
            // Default: run watch mode
            run_watch(prefs, prefs_path, None, None, false, None).await
        }
    }
}

/// Run the interactive watch mode
async fn run_watch(
    mut prefs: Preferences,
    prefs_path: PathBuf,
    dir: Option<PathBuf>,
    prefix: Option<String>,
    no_reorganize: bool,
    debounce_ms: Option<u64>,
) -> anyhow::Result<()> {
    let prefix = prefix
        .map(|p| validate_prefix(&p))
        .transpose()
        .context("Invalid --prefix")?;

    let initial = match dir {
        Some(dir) => {
            let dir = config::validate_directory(&dir).context("Invalid --dir")?;
            let prefix = prefix.clone().unwrap_or_else(|| prefs.prefix_for(&dir).to_string());
            Some(WatchConfig::new(&dir, &prefix, &prefs.extensions)?)
        }
        None => match (prefs.resume(), prefix.as_deref()) {
            (Some(Ok(saved)), Some(prefix)) => Some(saved.with_prefix(prefix)?),
            (Some(Ok(saved)), None) => Some(saved),
            (Some(Err(e)), _) => {
                warn!("Saved folder unavailable: {}", e);
                None
            }
            (None, _) => None,
        },
    };
    if let Some(prefix) = &prefix {
        prefs.prefix = prefix.clone();
    }

    let mut options = ControllerOptions::from_preferences(&prefs);
    options.prefix_override = prefix;
    if no_reorganize {
        options.reorganize_on_start = false;
    }
    if let Some(ms) = debounce_ms {
        options.watcher.debounce_ms = ms;
    }

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    let controller = Controller::new(
        prefs,
        prefs_path,
        options,
        spawn_stdin_reader(),
        shutdown_rx,
        std::io::stdout(),
    );
    controller.run(initial).await?;

    info!("seqrename stopped.");
    Ok(())
}

/// Reorganise one folder without watching it
fn run_organize(
    prefs: &Preferences,
    dir: &Path,
    prefix: Option<&str>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let dir = config::validate_directory(dir)?;
    let prefix = prefix.unwrap_or_else(|| prefs.prefix_for(&dir));
    let config = WatchConfig::new(&dir, prefix, &prefs.extensions)?;

    if dry_run {
        let plan = scanner::plan_reorganize(&config)?;
        if plan.is_empty() {
            println!("Nothing to rename in {}", dir.display());
        }
        for step in &plan {
            println!("Would rename: {} -> {}", step.from.display(), step.to.display());
        }
        return Ok(());
    }

    let report = scanner::reorganize(&config)?;
    println!("{} of {} file(s) renamed", report.renamed.len(), report.total);
    for (step, reason) in &report.failed {
        eprintln!("  Failed: {} ({})", step.from.display(), reason);
    }

    if !report.is_clean() {
        bail!("{} file(s) could not be renamed", report.failed.len());
    }
    Ok(())
}

/// Run preferences commands
fn run_config_command(
    mut prefs: Preferences,
    action: ConfigCommands,
    prefs_path: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&prefs)?;
            println!("{}", json);
        }
        ConfigCommands::Path => {
            println!("{}", prefs_path.display());
        }
        ConfigCommands::Reset { force } => {
            if !force {
                eprintln!("Use --force to confirm resetting preferences");
                return Ok(());
            }
            prefs = Preferences::default();
            prefs.save(prefs_path)?;
            println!("Preferences reset at {}", prefs_path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["seqrename"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_watch_command() {
        let cli = Cli::try_parse_from([
            "seqrename", "watch", "--dir", "/tmp/photos", "--prefix", "Trip", "--no-reorganize",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Watch { dir, prefix, no_reorganize, debounce_ms }) => {
                assert_eq!(dir, Some(PathBuf::from("/tmp/photos")));
                assert_eq!(prefix.as_deref(), Some("Trip"));
                assert!(no_reorganize);
                assert_eq!(debounce_ms, None);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_organize_command() {
        let cli = Cli::try_parse_from([
            "seqrename", "--config", "/tmp/prefs.json", "organize", "/tmp/photos", "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/prefs.json")));
        match cli.command {
            Some(Commands::Organize { dir, dry_run, prefix }) => {
                assert!(dry_run);
                assert!(prefix.is_none());
                assert_eq!(dir, PathBuf::from("/tmp/photos"));
            }
            _ => panic!("Expected Organize command"),
        }
    }
}
