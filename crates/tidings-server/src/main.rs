//! tidings server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, starts the dispatch workers and the hourly summary ticker, and
//! serves the JSON API over HTTP.

mod settings;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use tidings_engine::{
  Engine,
  clock::{Clock, SystemClock},
  queue::{TaskQueue, WorkerPool},
  ticker,
  transport::{ConfiguredMailer, Courier},
};
use tidings_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::{ServerConfig, expand_tilde};

#[derive(Parser)]
#[command(author, version, about = "Tidings notification server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg =
    ServerConfig::load(&cli.config).context("failed to load configuration")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let mailer = ConfiguredMailer::from_config(server_cfg.smtp.as_ref())
    .context("invalid smtp configuration")?;
  if server_cfg.smtp.is_none() {
    tracing::warn!("no [smtp] configured, emails will only be logged");
  }

  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let (tasks, receiver) = TaskQueue::new();
  let engine = Engine::new(
    Arc::new(store),
    Arc::new(Courier::new(mailer)),
    clock.clone(),
    tasks.clone(),
  );

  let pool = WorkerPool::spawn(engine.clone(), receiver, server_cfg.workers);
  let summary_ticker = tokio::spawn(ticker::run_summary_ticker(
    tasks,
    clock,
    Duration::from_secs(server_cfg.summary_interval_secs),
  ));

  let app = tidings_api::api_router(engine).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  summary_ticker.abort();
  pool.shutdown().await;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(error) = tokio::signal::ctrl_c().await {
    tracing::error!(%error, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
