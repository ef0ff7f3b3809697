//! Error taxonomy for the sync engine. Every variant here is recovered at the
//! video or channel scope; none of them aborts a sync cycle.

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("malformed response: {0}")]
  Parse(#[from] serde_json::Error),

  #[error("response is missing {0}")]
  MissingField(&'static str),

  #[error("player tokens not found on the page of video {video_id}")]
  TokensNotFound { video_id: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
  #[error("download failed: {0}")]
  Download(#[from] FetchError),

  #[error("image processing failed: {0}")]
  Image(#[from] image::ImageError),

  #[error("thumbnail worker crashed: {0}")]
  Worker(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("store I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("store serialization error: {0}")]
  Serde(#[from] serde_json::Error),
}
