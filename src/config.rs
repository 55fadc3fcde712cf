use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Smallest valid config file, shown when none is found
const MINIMAL_CONFIG: &str = "remote:\n  url: https://example.com/api\n";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the entries service, e.g. https://example.com/api
  pub url: String,
  /// Per-request timeout in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
  /// Database file (defaults to $XDG_DATA_HOME/entry-sync/store.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Queue length above which a sync pass logs a warning
  #[serde(default = "default_queue_warn_threshold")]
  pub queue_warn_threshold: usize,
}

fn default_queue_warn_threshold() -> usize {
  500
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      queue_warn_threshold: default_queue_warn_threshold(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for daily log files; stderr only when unset
  pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
  "warn".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./entry-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/entry-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/entry-sync/config.yaml \
         with at least:\n\n{}",
        MINIMAL_CONFIG
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("entry-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("entry-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the API token from environment variables, if one is set.
  ///
  /// Checks ENTRY_SYNC_TOKEN first, then ENTRY_SYNC_API_TOKEN as fallback.
  pub fn get_api_token() -> Option<String> {
    std::env::var("ENTRY_SYNC_TOKEN")
      .or_else(|_| std::env::var("ENTRY_SYNC_API_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
