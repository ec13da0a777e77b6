//! `cirl`: maintenance commands for the CIRL record store.
//!
//! # Usage
//!
//! ```
//! cirl migrate
//! cirl stats --app app_1 --app app_2
//! cirl --config /etc/cirl.toml stats --backend json
//! ```
//!
//! Settings come from the config file and `CIRL_*` environment variables;
//! see `cirl_store::StoreConfig`.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use cirl_core::store::RecordStore;
use cirl_store::{BackendKind, StoreConfig, StoreSelector, migrate};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Upper bound on closing the store before the process gives up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cirl", author, version, about = "CIRL record store maintenance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = "cirl.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Copy the JSON collections in the data directory into SQLite.
  Migrate,

  /// Print rolling request statistics as JSON.
  Stats {
    /// Restrict to these apps; they are reported even without traffic.
    #[arg(long = "app", value_name = "ID")]
    apps: Vec<String>,

    /// Backend to read from (json or sqlite). Defaults to the configured one.
    #[arg(long)]
    backend: Option<String>,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = StoreConfig::load(Some(&cli.config)).context("failed to load configuration")?;
  let selector = StoreSelector::new(config);

  let result = run(&selector, cli.command).await;
  shutdown(&selector).await;
  result
}

async fn run(selector: &StoreSelector, command: Command) -> Result<()> {
  match command {
    Command::Migrate => {
      let store = selector.get(Some(BackendKind::Sqlite)).await?;
      let sqlite = store.as_sqlite().context("sqlite backend expected")?;
      let data_dir = &selector.config().data_dir;

      let report = migrate::migrate(data_dir, sqlite)
        .await
        .with_context(|| format!("failed to migrate {}", data_dir.display()))?;
      for (collection, outcome) in &report.collections {
        println!("{collection:<24} {outcome:?}");
      }
    }
    Command::Stats { apps, backend } => {
      let kind = backend.as_deref().map(BackendKind::parse).transpose()?;
      let store = selector.get(kind).await?;
      let stats = store.request_stats(&apps).await?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
  }
  Ok(())
}

// ─── Shutdown ─────────────────────────────────────────────────────────────────

/// Close the store, exiting non-zero if it does not finish in time.
async fn shutdown(selector: &StoreSelector) {
  match tokio::time::timeout(SHUTDOWN_TIMEOUT, selector.close()).await {
    Ok(Ok(())) => tracing::debug!("store closed"),
    Ok(Err(err)) => tracing::error!(error = %err, "failed to close store"),
    Err(_) => {
      tracing::error!(timeout = ?SHUTDOWN_TIMEOUT, "store did not close in time, exiting");
      std::process::exit(1);
    }
  }
}
