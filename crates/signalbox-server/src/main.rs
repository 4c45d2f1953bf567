//! signalbox server binary.
//!
//! Reads `signalbox.toml` (or the path given with `--config`), opens the
//! SQLite audit log and serves the decision API over HTTP under `/api`.
//!
//! Any setting can be overridden from the environment with a `SIGNALBOX_`
//! prefix; nested keys use a double underscore, e.g.
//! `SIGNALBOX_ENGINE__SIMULATION__STEPS=40`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::Utc;
use clap::Parser;
use signalbox_engine::{Dispatcher, demo};
use signalbox_server::{ServerConfig, environment, expand_tilde};
use signalbox_store_sqlite::SqliteAuditLog;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Signalbox rail decision server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "signalbox.toml")]
  config: PathBuf,

  /// Load the built-in demonstration network before serving.
  #[arg(long)]
  seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config, environment())
    .with_context(|| format!("failed to load config from {:?}", cli.config))?;

  let audit = if server_cfg.in_memory_audit() {
    tracing::warn!("audit log is in memory; decisions will not survive a restart");
    SqliteAuditLog::open_in_memory()
      .await
      .context("failed to open in-memory audit log")?
  } else {
    let audit_path = expand_tilde(&server_cfg.audit_path);
    SqliteAuditLog::open(&audit_path)
      .await
      .with_context(|| format!("failed to open audit log at {audit_path:?}"))?
  };

  let dispatcher = Arc::new(Dispatcher::new(server_cfg.engine.clone(), Arc::new(audit)));

  if cli.seed_demo {
    let summary = dispatcher
      .ingest(demo::snapshot(Utc::now()))
      .await
      .context("failed to load demo network")?;
    tracing::info!(conflicts = summary.detected, "Loaded demo network");
  }

  let app = signalbox_server::app(dispatcher);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
