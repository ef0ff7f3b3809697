//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so endpoint templates and
//! limits never depend on runtime file I/O. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;

use crate::config::ChannelDescriptor;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Endpoints. `{...}` placeholders are substituted by the fetcher.
  pub channel_list_url: String,
  pub channel_referer_url: String,
  pub channel_origin: String,
  pub video_page_url: String,
  pub video_meta_url: String,
  pub video_origin: String,
  pub user_agent: String,

  // Detail page / metadata parsing
  pub player_init_marker: String,
  pub english_language_code: String,

  // Thumbnails
  pub max_thumbnail_size: u32,
  pub thumbnail_concurrency: usize,
  pub retained_thumbnail_failures: usize,

  /// Channels followed when no config file overrides them.
  pub default_channels: Vec<ChannelDescriptor>,
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed every test fails immediately.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
