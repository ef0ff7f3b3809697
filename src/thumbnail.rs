//! Preview thumbnails: download, decode, downsize, re-encode.
//!
//! Work runs on background tasks bounded by a semaphore. Results come back over a
//! channel and are applied by whoever owns the entry collection; workers never
//! touch entries themselves.

use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, warn};

use crate::constants::constants;
use crate::entry::EntryKey;
use crate::error::ThumbnailError;
use crate::fetcher::VideoSource;

/// Scale `(width, height)` so the longer side equals `bound`, keeping the aspect ratio.
/// Square images are bounded by height, which amounts to the same thing.
pub fn target_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
  let scale = |short: u32, long: u32| ((short as f64 * bound as f64 / long.max(1) as f64).round() as u32).max(1);
  if width > height { (bound, scale(height, width)) } else { (scale(width, height), bound) }
}

/// Decode `original`, shrink it to the thumbnail bound with Lanczos3 and re-encode as JPEG.
pub fn make_preview(original: &[u8], bound: u32) -> Result<Vec<u8>, ThumbnailError> {
  let image = image::load_from_memory(original)?;
  let (w, h) = target_dimensions(image.width(), image.height(), bound);
  let resized = DynamicImage::ImageRgb8(image.resize_exact(w, h, FilterType::Lanczos3).into_rgb8());

  let mut jpeg = Vec::new();
  resized.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;
  Ok(jpeg)
}

/// The captured result of one thumbnail task.
#[derive(Debug)]
pub struct ThumbnailOutcome {
  pub key: EntryKey,
  pub result: Result<Vec<u8>, ThumbnailError>,
}

#[derive(Debug)]
pub struct ThumbnailFailure {
  pub key: EntryKey,
  pub error: ThumbnailError,
}

/// Bounded, supervised pool of thumbnail tasks with at most one task per entry.
pub struct ThumbnailPipeline {
  permits: Arc<Semaphore>,
  tx: mpsc::UnboundedSender<ThumbnailOutcome>,
  rx: mpsc::UnboundedReceiver<ThumbnailOutcome>,
  in_flight: HashSet<EntryKey>,
  failures: VecDeque<ThumbnailFailure>,
  max_failures: usize,
}

impl ThumbnailPipeline {
  pub fn new(concurrency: usize) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      permits: Arc::new(Semaphore::new(concurrency.max(1))),
      tx,
      rx,
      in_flight: HashSet::new(),
      failures: VecDeque::new(),
      max_failures: constants().retained_thumbnail_failures,
    }
  }

  pub fn is_in_flight(&self, key: &EntryKey) -> bool {
    self.in_flight.contains(key)
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.len()
  }

  /// Start a task for `key` unless one is already running. Returns whether a task was started.
  pub fn schedule<S: VideoSource>(&mut self, source: &Arc<S>, key: EntryKey, url: &str) -> bool {
    if !self.in_flight.insert(key) {
      debug!(key = %key, "thumbnail: already in flight, not rescheduling");
      return false;
    }

    let source = Arc::clone(source);
    let permits = Arc::clone(&self.permits);
    let tx = self.tx.clone();
    let url = url.to_string();
    let bound = constants().max_thumbnail_size;

    tokio::spawn(async move {
      let work = tokio::spawn(async move {
        // The semaphore is never closed, so acquisition only fails if it were.
        let _permit = permits.acquire_owned().await.map_err(|e| ThumbnailError::Worker(e.to_string()))?;
        let original = source.download_thumbnail(&url).await?;
        let preview = tokio::task::spawn_blocking(move || make_preview(&original, bound))
          .await
          .map_err(|e| ThumbnailError::Worker(e.to_string()))??;
        Ok::<_, ThumbnailError>(preview)
      });
      let result = work.await.unwrap_or_else(|e| Err(ThumbnailError::Worker(e.to_string())));
      let _ = tx.send(ThumbnailOutcome { key, result });
    });
    true
  }

  /// Outcomes that have already arrived, without waiting.
  pub fn drain_ready(&mut self) -> Vec<ThumbnailOutcome> {
    let mut ready = Vec::new();
    while let Ok(outcome) = self.rx.try_recv() {
      ready.push(self.settle(outcome));
    }
    ready
  }

  /// Wait for the next outcome. `None` once nothing is in flight.
  pub async fn next_outcome(&mut self) -> Option<ThumbnailOutcome> {
    if self.in_flight.is_empty() {
      return None;
    }
    let outcome = self.rx.recv().await?;
    Some(self.settle(outcome))
  }

  fn settle(&mut self, outcome: ThumbnailOutcome) -> ThumbnailOutcome {
    self.in_flight.remove(&outcome.key);
    outcome
  }

  /// Keep a failure for later diagnostics, dropping the oldest beyond the retention cap.
  pub fn record_failure(&mut self, key: EntryKey, error: ThumbnailError) {
    warn!(key = %key, err = %error, "thumbnail: failed, entry keeps no preview");
    if self.failures.len() == self.max_failures {
      self.failures.pop_front();
    }
    self.failures.push_back(ThumbnailFailure { key, error });
  }

  pub fn failures(&self) -> impl Iterator<Item = &ThumbnailFailure> {
    self.failures.iter()
  }
}
