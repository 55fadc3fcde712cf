mod commands;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::{info, warn};

use entry_sync::config::{Config, StoreConfig};
use entry_sync::{
  Connectivity, HttpRemote, LocalStore, MemoryStore, OfflineController, SqliteStore, SyncEngine,
};

#[derive(Parser, Debug)]
#[command(name = "entry-sync")]
#[command(about = "Record purchases offline and sync them when the server is reachable")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/entry-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Do not contact the server; writes are only queued
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: commands::Command,
}

/// Open the durable store, falling back to memory for this session if it is unavailable.
async fn open_store(config: &StoreConfig) -> Result<Arc<dyn LocalStore>> {
  let sqlite = match &config.path {
    Some(path) => Ok(SqliteStore::new(path)),
    None => SqliteStore::at_default_path(),
  };

  let error = match sqlite {
    Ok(store) => match store.initialize().await {
      Ok(()) => {
        info!(path = ?store.path(), "Opened local store");
        return Ok(Arc::new(store));
      }
      Err(e) => e,
    },
    Err(e) => e,
  };

  warn!(error = %error, "Local store unavailable, changes will not survive this session");
  let memory = MemoryStore::new();
  memory
    .initialize()
    .await
    .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
  Ok(Arc::new(memory))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log)?;

  let store = open_store(&config.store).await?;
  let remote = Arc::new(
    HttpRemote::new(&config.remote, Config::get_api_token())
      .map_err(|e| eyre!("Failed to create remote client: {}", e))?,
  );

  let online = !args.offline && remote.is_reachable().await;
  info!(online, url = %config.remote.url, "Starting");

  let engine = Arc::new(SyncEngine::new(store.clone(), remote, config.sync.clone()));
  let controller = OfflineController::start(store.clone(), engine, Connectivity::new(online));

  let result = commands::run(args.command, &controller).await;

  // Let background passes finish before the store goes away
  controller.wait_for_background().await;
  controller.shutdown();
  store
    .close()
    .await
    .map_err(|e| eyre!("Failed to close local store: {}", e))?;

  result
}
