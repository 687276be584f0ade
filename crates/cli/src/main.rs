//! resfetch command-line entry point.
//!
//! Payloads are written to stdout. Logging goes to stderr as JSON so the
//! output can be piped.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use resfetch_client::fetch::canonicalize;
use resfetch_client::{CachedFetcher, GetOptions};
use resfetch_core::checksum::{CHECKSUM_HEADER, header_value};
use resfetch_core::{AppConfig, CacheDb, FlatStore};

#[derive(Debug, Parser)]
#[command(name = "resfetch")]
#[command(about = "Fetch remote resources through a persistent offline cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch a URL, racing alternates and falling back to the cache.
    Get {
        url: String,

        /// Alternate URL serving the same resource (repeatable).
        #[arg(long = "alt", value_name = "URL")]
        alternates: Vec<String>,

        /// Freshness window for a newly fetched payload.
        #[arg(long, value_name = "MS")]
        lifetime_ms: Option<u64>,

        /// Give up on the network after this long.
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },

    /// Print the Content-Hash header value for a file.
    Checksum { file: PathBuf },

    /// Remove entries from the cache.
    #[command(group(ArgGroup::new("target").required(true).multiple(true).args(["max_entries", "key"])))]
    Purge {
        /// Keep only the N most recently written entries.
        #[arg(long, value_name = "N")]
        max_entries: Option<usize>,

        /// Remove the entry for this URL from both tiers.
        #[arg(long, value_name = "URL")]
        key: Option<String>,
    },
}

fn get_options(alternates: Vec<String>, lifetime_ms: Option<u64>, timeout_ms: Option<u64>) -> GetOptions {
    let mut options = GetOptions { alternate_urls: alternates, ..GetOptions::default() };
    if let Some(ms) = lifetime_ms {
        options = options.with_lifetime(Duration::from_millis(ms));
    }
    if let Some(ms) = timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    options
}

async fn get(config: &AppConfig, url: &str, options: GetOptions) -> Result<()> {
    let fetcher = CachedFetcher::from_config(config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling fetch");
            on_interrupt.cancel();
        }
    });

    let resolved = fetcher.get(url, options.with_cancellation(cancel)).await?;

    tracing::info!(
        source = ?resolved.source,
        url = resolved.url.as_ref().map(|u| u.as_str()),
        bytes = resolved.payload.len(),
        "resolved"
    );

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&resolved.payload).await?;
    stdout.flush().await?;

    Ok(())
}

fn checksum(file: &Path) -> Result<String> {
    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    Ok(header_value(Some(&bytes)))
}

async fn purge(config: &AppConfig, max_entries: Option<usize>, key: Option<&str>) -> Result<()> {
    let db = CacheDb::open(&config.db_path).await?;

    if let Some(key) = key {
        let key = canonicalize(key)?.to_string();
        let removed = db.purge_key(&key).await?;
        if let Ok(flat) = FlatStore::open(&config.flat_store_dir) {
            flat.remove(&key)?;
        }
        tracing::info!(key = %key, removed, "purged key");
    }

    if let Some(max) = max_entries {
        let removed = db.purge_lru(max).await?;
        tracing::info!(max_entries = max, removed, "purged least recently written entries");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Get { url, alternates, lifetime_ms, timeout_ms } => {
            let config = AppConfig::load()?;
            get(&config, &url, get_options(alternates, lifetime_ms, timeout_ms)).await
        }
        Command::Checksum { file } => {
            println!("{CHECKSUM_HEADER}: {}", checksum(&file)?);
            Ok(())
        }
        Command::Purge { max_entries, key } => {
            let config = AppConfig::load()?;
            purge(&config, max_entries, key.as_deref()).await
        }
    }
}
