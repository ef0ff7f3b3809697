use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Composite identity of an entry. No other field participates in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
  pub channel_id: u32,
  pub video_id: u32,
}

impl EntryKey {
  pub fn new(channel_id: u32, video_id: u32) -> Self {
    Self { channel_id, video_id }
  }
}

impl fmt::Display for EntryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.channel_id, self.video_id)
  }
}

/// The fields a sync refreshes on every sighting of a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
  pub channel_name: String,
  pub title: String,
  #[serde(with = "duration_secs")]
  pub duration: Duration,
  pub date: DateTime<Utc>,
  pub has_english_subs: bool,
}

/// Individually tracked fields of an [`Entry`], reported in change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
  ChannelName,
  Title,
  Duration,
  Date,
  HasEnglishSubs,
  PreviewImage,
  Watched,
  Ignored,
}

/// One tracked video.
///
/// Fields are private: every mutation goes through [`crate::collection::EntryCollection`]
/// so views and the store hear about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
  #[serde(flatten)]
  key: EntryKey,
  #[serde(flatten)]
  info: VideoInfo,
  #[serde(default, with = "base64_bytes")]
  preview_image: Option<Vec<u8>>,
  #[serde(default)]
  is_watched: bool,
  #[serde(default)]
  is_ignored: bool,
}

impl Entry {
  pub fn new(key: EntryKey, info: VideoInfo) -> Self {
    Self { key, info, preview_image: None, is_watched: false, is_ignored: false }
  }

  pub fn key(&self) -> EntryKey {
    self.key
  }

  pub fn info(&self) -> &VideoInfo {
    &self.info
  }

  pub fn channel_name(&self) -> &str {
    &self.info.channel_name
  }

  pub fn title(&self) -> &str {
    &self.info.title
  }

  pub fn duration(&self) -> Duration {
    self.info.duration
  }

  pub fn date(&self) -> DateTime<Utc> {
    self.info.date
  }

  pub fn has_english_subs(&self) -> bool {
    self.info.has_english_subs
  }

  pub fn preview_image(&self) -> Option<&[u8]> {
    self.preview_image.as_deref().filter(|b| !b.is_empty())
  }

  pub fn has_preview(&self) -> bool {
    self.preview_image().is_some()
  }

  pub fn is_watched(&self) -> bool {
    self.is_watched
  }

  pub fn is_ignored(&self) -> bool {
    self.is_ignored
  }

  /// Has a thumbnail and reached a terminal state, so a sync no longer re-fetches it.
  pub fn is_settled(&self) -> bool {
    self.has_preview() && (self.is_watched || self.info.has_english_subs || self.is_ignored)
  }

  /// Overwrite the sync-owned fields, returning which ones actually changed.
  /// User flags and the preview image are left alone.
  pub(crate) fn copy_live_data(&mut self, info: VideoInfo) -> Vec<EntryField> {
    let mut changed = Vec::new();
    if self.info.channel_name != info.channel_name {
      changed.push(EntryField::ChannelName);
    }
    if self.info.title != info.title {
      changed.push(EntryField::Title);
    }
    if self.info.duration != info.duration {
      changed.push(EntryField::Duration);
    }
    if self.info.date != info.date {
      changed.push(EntryField::Date);
    }
    if self.info.has_english_subs != info.has_english_subs {
      changed.push(EntryField::HasEnglishSubs);
    }
    self.info = info;
    changed
  }

  pub(crate) fn set_preview_image(&mut self, bytes: Option<Vec<u8>>) -> bool {
    let bytes = bytes.filter(|b| !b.is_empty());
    if self.preview_image() == bytes.as_deref() {
      return false;
    }
    self.preview_image = bytes;
    true
  }

  pub(crate) fn set_watched(&mut self, value: bool) -> bool {
    std::mem::replace(&mut self.is_watched, value) != value
  }

  pub(crate) fn set_ignored(&mut self, value: bool) -> bool {
    std::mem::replace(&mut self.is_ignored, value) != value
  }
}

/// Durations are stored as fractional seconds, the unit the metadata API reports.
mod duration_secs {
  use serde::{Deserialize, Deserializer, Serializer};
  use std::time::Duration;

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
  }
}

mod base64_bytes {
  use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
      None => serializer.serialize_none(),
    }
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
    let Some(encoded) = Option::<String>::deserialize(deserializer)? else { return Ok(None) };
    BASE64.decode(encoded).map(Some).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
pub(crate) fn sample_info(title: &str, has_english_subs: bool) -> VideoInfo {
  use chrono::TimeZone;
  VideoInfo {
    channel_name: "GFRIEND".to_string(),
    title: title.to_string(),
    duration: Duration::from_secs(95),
    date: Utc.with_ymd_and_hms(2020, 6, 10, 9, 0, 0).unwrap(),
    has_english_subs,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settled_requires_preview_and_terminal_state() {
    let mut entry = Entry::new(EntryKey::new(128, 555), sample_info("Live", true));
    assert!(!entry.is_settled(), "no preview yet");

    entry.set_preview_image(Some(vec![1, 2, 3]));
    assert!(entry.is_settled(), "preview + english subs");

    entry.copy_live_data(sample_info("Live", false));
    assert!(!entry.is_settled());

    entry.set_ignored(true);
    assert!(entry.is_settled());
  }

  #[test]
  fn empty_preview_counts_as_missing() {
    let mut entry = Entry::new(EntryKey::new(1, 2), sample_info("x", false));
    assert!(!entry.set_preview_image(Some(Vec::new())));
    assert!(!entry.has_preview());
    assert!(entry.set_preview_image(Some(vec![9])));
    assert!(!entry.set_preview_image(Some(vec![9])), "same bytes is not a change");
  }

  #[test]
  fn copy_live_data_reports_only_changed_fields() {
    let mut entry = Entry::new(EntryKey::new(1, 2), sample_info("old", false));
    entry.set_watched(true);

    let changed = entry.copy_live_data(sample_info("new", true));

    assert_eq!(changed, vec![EntryField::Title, EntryField::HasEnglishSubs]);
    assert!(entry.is_watched());
    assert_eq!(entry.title(), "new");
  }

  #[test]
  fn serializes_flat_record() {
    let mut entry = Entry::new(EntryKey::new(128, 555), sample_info("Live", false));
    entry.set_preview_image(Some(vec![0xff, 0xd8]));
    entry.set_watched(true);

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["channel_id"], 128);
    assert_eq!(json["video_id"], 555);
    assert_eq!(json["duration"], 95.0);
    assert_eq!(json["preview_image"], "/9g=");
    assert_eq!(json["is_watched"], true);

    let back: Entry = serde_json::from_value(json).unwrap();
    assert_eq!(back.key(), entry.key());
    assert_eq!(back.preview_image(), Some(&[0xff, 0xd8][..]));
    assert!(back.is_watched());
  }
}
