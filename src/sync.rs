//! The sync cycle: poll followed channels, fetch metadata for every unsettled
//! video, reconcile it into the library and queue missing thumbnails.
//!
//! Network calls run strictly one after another. Thumbnails are the only
//! concurrent work and are never awaited by the cycle itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::config::ChannelDescriptor;
use crate::entry::{Entry, EntryKey, VideoInfo};
use crate::error::FetchError;
use crate::fetcher::{VideoSource, VideoSummary};
use crate::library::Library;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
  Idle,
  Running,
}

/// Shared single-flight flag. Cloning shares the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
  running: Arc<AtomicBool>,
}

impl SyncStatus {
  pub fn state(&self) -> SyncState {
    if self.running.load(Ordering::Acquire) { SyncState::Running } else { SyncState::Idle }
  }

  pub fn is_refreshing(&self) -> bool {
    self.state() == SyncState::Running
  }

  /// Idle -> Running, atomically. `None` if a cycle already holds the flag.
  pub fn try_begin(&self) -> Option<RunningGuard> {
    self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| RunningGuard { running: Arc::clone(&self.running) })
  }
}

/// Holds the Running state; dropping it (normally, on error or on panic) returns to Idle.
#[derive(Debug)]
pub struct RunningGuard {
  running: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
  fn drop(&mut self) {
    self.running.store(false, Ordering::Release);
  }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
  pub channels_polled: usize,
  pub channels_failed: usize,
  pub inserted: usize,
  pub updated: usize,
  pub skipped_settled: usize,
  pub videos_failed: usize,
  pub thumbnails_scheduled: usize,
}

pub struct Syncer<S> {
  source: Arc<S>,
  channels: Vec<ChannelDescriptor>,
  status: SyncStatus,
}

impl<S: VideoSource> Syncer<S> {
  pub fn new(source: Arc<S>, channels: Vec<ChannelDescriptor>) -> Self {
    Self { source, channels, status: SyncStatus::default() }
  }

  pub fn status(&self) -> &SyncStatus {
    &self.status
  }

  pub fn channels(&self) -> &[ChannelDescriptor] {
    &self.channels
  }

  /// Run one full cycle. Returns `None` without doing anything if a cycle is already running.
  ///
  /// Per-channel and per-video failures are logged and skipped; the cycle always
  /// reaches Idle again.
  pub async fn run_cycle(&self, library: &mut Library) -> Option<CycleReport> {
    let Some(_running) = self.status.try_begin() else {
      debug!("sync: cycle already running, ignoring request");
      return None;
    };

    info!(channels = self.channels.len(), "sync: cycle started");
    let mut report = CycleReport::default();

    for channel in &self.channels {
      report.channels_polled += 1;
      let listing = match self.source.list_videos(channel).await {
        Ok(listing) => listing,
        Err(e) => {
          warn!(channel = channel.id, err = %e, "sync: channel listing failed, skipping channel");
          report.channels_failed += 1;
          continue;
        }
      };

      for video in &listing.videos {
        library.apply_finished_thumbnails();

        let key = EntryKey::new(channel.id, video.video_id);
        if library.get(&key).is_some_and(Entry::is_settled) {
          report.skipped_settled += 1;
          continue;
        }

        if let Err(e) = self.sync_video(library, &listing.channel_name, key, video, &mut report).await {
          warn!(channel = channel.id, video = video.video_id, err = %e, "sync: video skipped");
          report.videos_failed += 1;
        }
      }
    }

    library.apply_finished_thumbnails();
    info!(?report, thumbnails_pending = library.thumbnails_in_flight(), "sync: cycle finished");
    Some(report)
  }

  async fn sync_video(
    &self,
    library: &mut Library,
    channel_name: &str,
    key: EntryKey,
    video: &VideoSummary,
    report: &mut CycleReport,
  ) -> Result<(), FetchError> {
    let detail = self.source.fetch_video_detail(video.video_id).await?;
    let info = VideoInfo {
      channel_name: channel_name.to_string(),
      title: video.title.clone(),
      duration: detail.duration,
      date: video.created_at,
      has_english_subs: detail.has_english_subs,
    };

    let outcome = library.merge(Entry::new(key, info));
    if outcome.inserted {
      report.inserted += 1;
    } else {
      report.updated += 1;
    }

    if library.needs_thumbnail(&key)
      && !video.thumbnail_url.trim().is_empty()
      && library.schedule_thumbnail(&self.source, key, &video.thumbnail_url)
    {
      report.thumbnails_scheduled += 1;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;
  use crate::testing::{FakeSource, channel, png_bytes, summary};

  const THUMB: &str = "https://img/555.jpg";

  fn library() -> Library {
    Library::open(Box::new(MemoryStore::new()), 2).unwrap()
  }

  #[test]
  fn status_transitions_are_single_flight() {
    let status = SyncStatus::default();
    assert_eq!(status.state(), SyncState::Idle);

    let guard = status.try_begin().expect("idle status can begin");
    assert!(status.is_refreshing());
    assert!(status.clone().try_begin().is_none(), "clones share the flag");

    drop(guard);
    assert_eq!(status.state(), SyncState::Idle);
    assert!(status.try_begin().is_some());
  }

  #[tokio::test]
  async fn overlapping_cycle_is_a_no_op() {
    let source = Arc::new(FakeSource::default().with_listing(128, "GFRIEND", vec![summary(555, THUMB)]));
    let syncer = Syncer::new(Arc::clone(&source), vec![channel(128)]);
    let mut lib = library();

    let guard = syncer.status().try_begin().unwrap();
    assert_eq!(syncer.run_cycle(&mut lib).await, None);
    assert!(source.detail_calls().is_empty());
    drop(guard);

    assert!(syncer.run_cycle(&mut lib).await.is_some());
    assert_eq!(syncer.status().state(), SyncState::Idle);
  }

  #[tokio::test]
  async fn resync_keeps_identity_and_settles_entry() {
    let source = Arc::new(
      FakeSource::default()
        .with_listing(128, "GFRIEND", vec![summary(555, THUMB)])
        .with_detail(555, 300, false)
        .with_thumbnail(THUMB, png_bytes(640, 360)),
    );
    let syncer = Syncer::new(Arc::clone(&source), vec![channel(128)]);
    let mut lib = library();
    let key = EntryKey::new(128, 555);

    // First cycle: discovered, thumbnail scheduled.
    let first = syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!((first.inserted, first.thumbnails_scheduled), (1, 1));
    assert_eq!(lib.wait_for_thumbnails().await, 1);
    assert!(!lib.get(&key).unwrap().has_english_subs());

    // Second cycle: subtitles appeared. Same entry, user flags untouched.
    source.set_detail(555, 300, true);
    let second = syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!((second.inserted, second.updated, second.thumbnails_scheduled), (0, 1, 0));
    assert_eq!(lib.len(), 1);
    let entry = lib.get(&key).unwrap();
    assert!(entry.has_english_subs());
    assert!(!entry.is_watched() && !entry.is_ignored());
    assert!(entry.has_preview());
    assert!(entry.is_settled());

    // Third cycle: settled, so no detail fetch for it.
    source.clear_detail_calls();
    let third = syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!(third.skipped_settled, 1);
    assert!(source.detail_calls().is_empty());
  }

  #[tokio::test]
  async fn watched_entry_with_thumbnail_is_not_refetched() {
    let source = Arc::new(
      FakeSource::default()
        .with_listing(128, "GFRIEND", vec![summary(1, THUMB), summary(2, THUMB)])
        .with_detail(1, 60, false)
        .with_detail(2, 60, false)
        .with_thumbnail(THUMB, png_bytes(100, 100)),
    );
    let syncer = Syncer::new(Arc::clone(&source), vec![channel(128)]);
    let mut lib = library();

    syncer.run_cycle(&mut lib).await.unwrap();
    lib.wait_for_thumbnails().await;
    lib.set_watched(&EntryKey::new(128, 1), true).unwrap();
    source.clear_detail_calls();

    syncer.run_cycle(&mut lib).await.unwrap();

    assert_eq!(source.detail_calls(), vec![2]);
    assert!(lib.get(&EntryKey::new(128, 1)).unwrap().is_watched());
  }

  #[tokio::test]
  async fn failures_are_isolated_per_video_and_channel() {
    let source = Arc::new(
      FakeSource::default()
        .with_listing(128, "GFRIEND", vec![summary(10, ""), summary(11, ""), summary(12, "")])
        .with_detail(10, 60, true)
        .with_detail(12, 60, false)
        .with_listing(358, "DC", vec![summary(20, "")])
        .with_detail(20, 60, true),
    );
    // 999 has no listing: the whole channel fails. 11 has no tokens: only that video fails.
    let syncer = Syncer::new(Arc::clone(&source), vec![channel(999), channel(128), channel(358)]);
    let mut lib = library();

    let report = syncer.run_cycle(&mut lib).await.unwrap();

    assert_eq!(report.channels_polled, 3);
    assert_eq!(report.channels_failed, 1);
    assert_eq!(report.videos_failed, 1);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.thumbnails_scheduled, 0, "no thumbnail urls");
    assert_eq!(source.detail_calls(), vec![10, 11, 12, 20]);
    let keys: Vec<EntryKey> = lib.entries().map(|e| e.key()).collect();
    assert_eq!(keys, vec![EntryKey::new(128, 10), EntryKey::new(128, 12), EntryKey::new(358, 20)]);
    assert_eq!(lib.get(&EntryKey::new(358, 20)).unwrap().channel_name(), "DC");
    assert_eq!(syncer.status().state(), SyncState::Idle);

    // The skipped video is retried on the next cycle.
    source.set_detail(11, 60, false);
    let retry = syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!(retry.inserted, 1);
    assert_eq!(lib.len(), 4);
  }

  #[tokio::test]
  async fn broken_thumbnail_keeps_metadata_and_is_retried() {
    let source = Arc::new(
      FakeSource::default()
        .with_listing(128, "GFRIEND", vec![summary(1, "https://img/broken.jpg")])
        .with_detail(1, 60, true),
    );
    let syncer = Syncer::new(Arc::clone(&source), vec![channel(128)]);
    let mut lib = library();

    syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!(lib.wait_for_thumbnails().await, 0);
    assert_eq!(lib.thumbnail_failures().count(), 1);
    assert!(lib.get(&EntryKey::new(128, 1)).unwrap().has_english_subs());

    let again = syncer.run_cycle(&mut lib).await.unwrap();
    assert_eq!(again.skipped_settled, 0, "no thumbnail, so not settled");
    assert_eq!(again.thumbnails_scheduled, 1);
  }
}
