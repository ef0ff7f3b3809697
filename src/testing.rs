//! In-memory [`VideoSource`] and image helpers shared by unit tests.

use chrono::{TimeZone, Utc};
use image::{ImageBuffer, ImageFormat, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::ChannelDescriptor;
use crate::error::FetchError;
use crate::fetcher::{ChannelListing, VideoDetail, VideoSource, VideoSummary};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
  let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 90]));
  let mut buf = Vec::new();
  img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
  buf
}

pub fn channel(id: u32) -> ChannelDescriptor {
  ChannelDescriptor { code: format!("C{id}"), id }
}

pub fn summary(video_id: u32, thumbnail_url: &str) -> VideoSummary {
  VideoSummary {
    video_id,
    title: format!("video {video_id}"),
    created_at: Utc.with_ymd_and_hms(2020, 6, 10, 9, 0, 0).unwrap(),
    thumbnail_url: thumbnail_url.to_string(),
  }
}

/// Canned responses. Anything not configured fails the way the network would.
#[derive(Default)]
pub struct FakeSource {
  listings: Mutex<HashMap<u32, ChannelListing>>,
  details: Mutex<HashMap<u32, VideoDetail>>,
  thumbnails: HashMap<String, Vec<u8>>,
  detail_calls: Mutex<Vec<u32>>,
  downloads: AtomicUsize,
}

impl FakeSource {
  pub fn with_listing(self, channel_id: u32, channel_name: &str, videos: Vec<VideoSummary>) -> Self {
    self.set_listing(channel_id, channel_name, videos);
    self
  }

  pub fn with_detail(self, video_id: u32, secs: u64, has_english_subs: bool) -> Self {
    self.set_detail(video_id, secs, has_english_subs);
    self
  }

  pub fn with_thumbnail(mut self, url: &str, bytes: Vec<u8>) -> Self {
    self.thumbnails.insert(url.to_string(), bytes);
    self
  }

  pub fn set_listing(&self, channel_id: u32, channel_name: &str, videos: Vec<VideoSummary>) {
    let listing = ChannelListing { channel_name: channel_name.to_string(), videos };
    self.listings.lock().unwrap().insert(channel_id, listing);
  }

  pub fn set_detail(&self, video_id: u32, secs: u64, has_english_subs: bool) {
    let detail = VideoDetail { duration: Duration::from_secs(secs), has_english_subs };
    self.details.lock().unwrap().insert(video_id, detail);
  }

  /// Video ids passed to `fetch_video_detail`, in call order.
  pub fn detail_calls(&self) -> Vec<u32> {
    self.detail_calls.lock().unwrap().clone()
  }

  pub fn clear_detail_calls(&self) {
    self.detail_calls.lock().unwrap().clear();
  }

  pub fn thumbnail_downloads(&self) -> usize {
    self.downloads.load(Ordering::SeqCst)
  }
}

impl VideoSource for FakeSource {
  async fn list_videos(&self, channel: &ChannelDescriptor) -> Result<ChannelListing, FetchError> {
    let listing = self.listings.lock().unwrap().get(&channel.id).cloned();
    listing.ok_or(FetchError::MissingField("result"))
  }

  async fn fetch_video_detail(&self, video_id: u32) -> Result<VideoDetail, FetchError> {
    self.detail_calls.lock().unwrap().push(video_id);
    let detail = self.details.lock().unwrap().get(&video_id).copied();
    detail.ok_or(FetchError::TokensNotFound { video_id })
  }

  async fn download_thumbnail(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    self.downloads.fetch_add(1, Ordering::SeqCst);
    tokio::task::yield_now().await;
    self.thumbnails.get(url).cloned().ok_or(FetchError::MissingField("thumbnail"))
  }
}
