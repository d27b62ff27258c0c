//! Server configuration, deserialised from `config.toml` layered with
//! `TIDINGS_*` environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tidings_engine::transport::SmtpConfig;

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("tidings.sqlite") }
fn default_workers() -> usize { 4 }
fn default_summary_interval_secs() -> u64 { 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                  String,
  #[serde(default = "default_port")]
  pub port:                  u16,
  #[serde(default = "default_store_path")]
  pub store_path:            PathBuf,
  #[serde(default = "default_workers")]
  pub workers:               usize,
  #[serde(default = "default_summary_interval_secs")]
  pub summary_interval_secs: u64,
  /// Emails are only logged when absent.
  pub smtp:                  Option<SmtpConfig>,
}

impl ServerConfig {
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("TIDINGS")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
