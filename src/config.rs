use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::constants;

/// A followed channel: the short code used in channel page URLs plus the numeric id the APIs expect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
  pub code: String,
  pub id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
  /// Followed channels, polled in this order.
  pub channels: Vec<ChannelDescriptor>,
  pub store_path: Option<PathBuf>,
  pub thumbnail_concurrency: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      channels: constants().default_channels.clone(),
      store_path: None,
      thumbnail_concurrency: constants().thumbnail_concurrency,
    }
  }
}

fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "subwatch")
}

impl Config {
  /// Load `prefs.toml` from the platform config dir, falling back to defaults
  /// when the file is missing or unreadable.
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  /// Load an explicitly requested config file. Unlike [`Config::load`] this fails loudly.
  pub fn load_from(path: &Path) -> Result<Self> {
    let content =
      std::fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
  }

  /// Where the entry store lives: the configured path, or `entries.json` in the data dir.
  pub fn resolved_store_path(&self) -> Option<PathBuf> {
    self.store_path.clone().or_else(|| project_dirs().map(|d| d.data_dir().join("entries.json")))
  }

  pub fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.cache_dir().to_path_buf())
  }
}
