//! Display helpers for listing entries.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::constants::constants;
use crate::entry::Entry;

/// "H:MM min" from one hour up, otherwise whole minutes, never less than one.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let (hours, minutes) = (secs / 3600, secs % 3600 / 60);
  if hours > 0 { format!("{hours}:{minutes:02} min") } else { format!("{} min", minutes.max(1)) }
}

pub fn format_date(date: DateTime<Utc>) -> String {
  date.format("%Y-%m-%d %H:%M").to_string()
}

/// The public watch page of a video.
pub fn video_url(video_id: u32) -> String {
  constants().video_page_url.replace("{video_id}", &video_id.to_string())
}

/// Truncate a string to `max_width` characters, appending "…" if truncated.
pub fn truncate_str(s: &str, max_width: usize) -> String {
  if s.chars().count() <= max_width {
    s.to_string()
  } else {
    let truncated: String = s.chars().take(max_width.saturating_sub(1)).collect();
    format!("{}…", truncated)
  }
}

/// One line of `list` output: flags, date, duration, channel, title and URL.
pub fn entry_line(entry: &Entry, title_width: usize) -> String {
  let flags: String = [
    (entry.has_english_subs(), 'S'),
    (entry.is_watched(), 'W'),
    (entry.is_ignored(), 'I'),
    (entry.has_preview(), 'P'),
  ]
  .iter()
  .map(|&(on, c)| if on { c } else { '-' })
  .collect();

  format!(
    "{flags} {date}  {duration:>10}  {key:<12} {channel}: {title}  {url}",
    date = format_date(entry.date()),
    duration = format_duration(entry.duration()),
    key = entry.key().to_string(),
    channel = entry.channel_name(),
    title = truncate_str(entry.title(), title_width),
    url = video_url(entry.key().video_id),
  )
}
