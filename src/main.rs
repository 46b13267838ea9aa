#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudtree::app::config::ExplorerConfig;
use cloudtree::app::resource_explorer::{
    DefaultNodeFactory, ExplorerContext, InventorySnapshot, ResourceExplorer, SnapshotProvider,
    TreeRenderer,
};
use cloudtree::{log_error, log_info, log_warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(
    name = "cloudtree",
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_BRANCH"),
        "@",
        env!("GIT_COMMIT"),
        ")"
    ),
    about = "Browse and search a cloud inventory as a lazily loaded tree"
)]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand the inventory tree and print it
    Browse {
        /// JSON inventory snapshot
        #[arg(long)]
        inventory: PathBuf,

        /// Levels to expand below each account
        #[arg(long, default_value_t = 4)]
        depth: usize,

        /// Only print branches whose labels fuzzy-match this text
        #[arg(long)]
        filter: Option<String>,

        /// Show how long ago each expanded node was loaded
        #[arg(long)]
        show_age: bool,
    },

    /// Search resource names and print the grouped results
    Search {
        /// JSON inventory snapshot
        #[arg(long)]
        inventory: PathBuf,

        query: String,
    },
}

fn init_logging(config: &ExplorerConfig, log_stderr: bool) -> Result<Option<PathBuf>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => tracing_subscriber::EnvFilter::builder()
            .parse(&value)
            .context("Invalid RUST_LOG filter")?,
        _ => tracing_subscriber::EnvFilter::builder()
            .parse(&config.log_filter)
            .with_context(|| format!("Invalid log_filter '{}'", config.log_filter))?,
    };

    let log_path = if log_stderr {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
        None
    } else {
        let Some(proj_dirs) = directories::ProjectDirs::from("com", "", "cloudtree") else {
            return Ok(None);
        };
        let log_dir = proj_dirs.data_dir().join("logs");
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create {}", log_dir.display()))?;
        let log_path = log_dir.join("cloudtree.log");

        let file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

        // Owner read/write only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) =
                std::fs::set_permissions(&log_path, std::fs::Permissions::from_mode(0o600))
            {
                eprintln!("Failed to set log file permissions: {}", e);
            }
        }

        let subscriber = tracing_subscriber::registry().with(filter).with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        );
        tracing::subscriber::set_global_default(subscriber)
            .context("Failed to set tracing subscriber")?;
        Some(log_path)
    };

    // Bridge `log` records (the log_* macros) into tracing. Must follow the subscriber.
    tracing_log::LogTracer::init().context("Failed to initialize log-to-tracing bridge")?;

    if let Some(path) = &log_path {
        tracing::info!("Logging initialized to: {:?}", path);
    }
    Ok(log_path)
}

fn load_config(path: Option<&Path>) -> Result<ExplorerConfig> {
    match path {
        Some(path) => ExplorerConfig::load_from_path(path),
        None => ExplorerConfig::load(),
    }
}

fn build_explorer(inventory: &Path, config: ExplorerConfig) -> Result<ResourceExplorer> {
    let snapshot = InventorySnapshot::load_from_path(inventory)?;
    let provider = Arc::new(SnapshotProvider::new(snapshot));
    let accounts = provider.account_labels();
    log_info!(
        "Loaded inventory {} with {} accounts",
        inventory.display(),
        accounts.len()
    );
    let ctx = ExplorerContext::new(
        provider.clone(),
        provider,
        Arc::new(DefaultNodeFactory),
        config,
    );
    Ok(ResourceExplorer::new(ctx, &accounts))
}

/// Cancel everything in flight on Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_warn!("Interrupted, cancelling outstanding loads");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config, cli.log_stderr)?;
    tracing::info!("cloudtree {} starting", env!("CARGO_PKG_VERSION"));

    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Command::Browse {
            inventory,
            depth,
            filter,
            show_age,
        } => {
            let explorer = build_explorer(&inventory, config)?;
            let stats = explorer
                .expand_all(depth, &cancel)
                .await
                .context("Browse was cancelled")?;
            let renderer = TreeRenderer::new()
                .with_filter(filter.as_deref().unwrap_or_default())
                .with_age(show_age);
            print!("{}", renderer.render(explorer.root()));
            eprintln!(
                "{} nodes expanded, {} failed, {} partial",
                stats.expanded, stats.failed, stats.partial
            );
        }
        Command::Search { inventory, query } => {
            let explorer = build_explorer(&inventory, config)?;
            let (results, summary) = explorer
                .search(&query, &cancel)
                .await
                .context("Search was cancelled")?;
            print!("{}", TreeRenderer::new().render(results.root()));
            eprintln!(
                "{} matches in {} accounts / {} subscriptions",
                summary.matches, summary.accounts, summary.subscriptions
            );
            if let Some(error) = summary.error {
                log_error!("Search ended early: {}", error);
                anyhow::bail!("search failed: {}", error);
            }
        }
    }
    Ok(())
}
