use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use reqwest::header::{ACCEPT, ORIGIN, REFERER};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

use crate::config::ChannelDescriptor;
use crate::constants::constants;
use crate::error::FetchError;

/// A video as it appears in a channel listing.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummary {
  pub video_id: u32,
  pub title: String,
  pub created_at: DateTime<Utc>,
  /// Empty when the listing carries no thumbnail.
  pub thumbnail_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelListing {
  pub channel_name: String,
  pub videos: Vec<VideoSummary>,
}

/// Per-video metadata scraped from the player API.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoDetail {
  pub duration: Duration,
  pub has_english_subs: bool,
}

/// The two opaque strings the player API needs, embedded in the video page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerTokens {
  pub video_key_id: String,
  pub key: String,
}

/// Everything a sync cycle needs from the network.
pub trait VideoSource: Send + Sync + 'static {
  fn list_videos(&self, channel: &ChannelDescriptor) -> impl Future<Output = Result<ChannelListing, FetchError>> + Send;

  fn fetch_video_detail(&self, video_id: u32) -> impl Future<Output = Result<VideoDetail, FetchError>> + Send;

  fn download_thumbnail(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

// --- Wire formats ---

#[derive(Deserialize)]
struct ChannelResponse {
  result: Option<ChannelResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResult {
  channel_info: Option<ChannelInfo>,
  video_list: Option<Vec<WireVideo>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelInfo {
  channel_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVideo {
  video_seq: u32,
  title: String,
  #[serde(deserialize_with = "deserialize_timestamp")]
  created_at: DateTime<Utc>,
  #[serde(default)]
  thumbnail: Option<String>,
}

#[derive(Deserialize)]
struct MetaResponse {
  captions: Option<WireList<WireCaption>>,
  videos: Option<WireList<WireVariant>>,
}

#[derive(Deserialize)]
struct WireList<T> {
  #[serde(default = "Vec::new")]
  list: Vec<T>,
}

#[derive(Deserialize)]
struct WireCaption {
  language: Option<String>,
}

#[derive(Deserialize)]
struct WireVariant {
  duration: f64,
}

/// Accepts RFC 3339 or the API's `YYYY-MM-DD HH:MM:SS`, the latter read as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
  let raw = String::deserialize(deserializer)?;
  parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp '{}'", raw)))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| naive.and_utc())
}

// --- Parsers ---

/// Parse a channel video-list response.
pub fn parse_channel_listing(body: &str) -> Result<ChannelListing, FetchError> {
  let response: ChannelResponse = serde_json::from_str(body)?;
  let result = response.result.ok_or(FetchError::MissingField("result"))?;
  let channel_name = result.channel_info.ok_or(FetchError::MissingField("result.channelInfo"))?.channel_name;
  let videos = result
    .video_list
    .ok_or(FetchError::MissingField("result.videoList"))?
    .into_iter()
    .map(|v| VideoSummary {
      video_id: v.video_seq,
      title: v.title,
      created_at: v.created_at,
      thumbnail_url: v.thumbnail.map(|t| t.trim().to_string()).unwrap_or_default(),
    })
    .collect();
  Ok(ChannelListing { channel_name, videos })
}

/// Find the two quoted literals passed to the player initializer.
///
/// After `marker`, the first two lines that begin (after indentation) with a
/// double-quoted string are taken as the id and the key, in that order.
pub fn extract_player_tokens(html: &str, marker: &str) -> Option<PlayerTokens> {
  let (_, after) = html.split_once(marker)?;
  let mut literals = after.lines().skip(1).filter_map(|line| {
    let rest = line.trim_start().strip_prefix('"')?;
    let (literal, _) = rest.split_once('"')?;
    (!literal.is_empty()).then(|| literal.to_string())
  });
  let video_key_id = literals.next()?;
  let key = literals.next()?;
  Some(PlayerTokens { video_key_id, key })
}

/// Parse a player metadata response into duration + English caption availability.
pub fn parse_video_metadata(body: &str, english_code: &str) -> Result<VideoDetail, FetchError> {
  let response: MetaResponse = serde_json::from_str(body)?;
  let has_english_subs = response
    .captions
    .is_some_and(|c| c.list.iter().any(|caption| caption.language.as_deref() == Some(english_code)));
  let first = response
    .videos
    .and_then(|v| v.list.into_iter().next())
    .ok_or(FetchError::MissingField("videos.list[0]"))?;
  let duration = Duration::try_from_secs_f64(first.duration).map_err(|_| FetchError::MissingField("a valid duration"))?;
  Ok(VideoDetail { duration, has_english_subs })
}

fn fill(template: &str, params: &[(&str, &str)]) -> String {
  params.iter().fold(template.to_string(), |url, (name, value)| url.replace(&format!("{{{}}}", name), value))
}

// --- HTTP client ---

/// The live HTTP implementation of [`VideoSource`].
#[derive(Debug, Clone)]
pub struct VliveClient {
  http: Client,
}

impl VliveClient {
  pub fn new() -> Result<Self, FetchError> {
    let http = Client::builder().user_agent(constants().user_agent.as_str()).build()?;
    Ok(Self { http })
  }

  async fn fetch_video_page(&self, video_id: u32) -> Result<String, FetchError> {
    let url = fill(&constants().video_page_url, &[("video_id", video_id.to_string().as_str())]);
    Ok(self.http.get(&url).send().await?.error_for_status()?.text().await?)
  }

  async fn fetch_video_metadata(&self, video_id: u32, tokens: &PlayerTokens) -> Result<String, FetchError> {
    let c = constants();
    let url = fill(&c.video_meta_url, &[("vid", tokens.video_key_id.as_str()), ("key", tokens.key.as_str())]);
    let referer = fill(&c.video_page_url, &[("video_id", video_id.to_string().as_str())]);
    let response = self
      .http
      .get(&url)
      .header(ACCEPT, "*/*")
      .header(REFERER, referer)
      .header(ORIGIN, c.video_origin.as_str())
      .send()
      .await?
      .error_for_status()?;
    Ok(response.text().await?)
  }
}

impl VideoSource for VliveClient {
  async fn list_videos(&self, channel: &ChannelDescriptor) -> Result<ChannelListing, FetchError> {
    let c = constants();
    let url = fill(&c.channel_list_url, &[("channel_id", channel.id.to_string().as_str())]);
    let referer = fill(&c.channel_referer_url, &[("channel_code", channel.code.as_str())]);
    let body = self
      .http
      .get(&url)
      .header(ACCEPT, "application/json, text/plain, */*")
      .header(REFERER, referer)
      .header(ORIGIN, c.channel_origin.as_str())
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;
    let listing = parse_channel_listing(&body)?;
    debug!(channel = channel.id, videos = listing.videos.len(), "fetch: channel listed");
    Ok(listing)
  }

  async fn fetch_video_detail(&self, video_id: u32) -> Result<VideoDetail, FetchError> {
    let c = constants();
    let page = self.fetch_video_page(video_id).await?;
    let tokens =
      extract_player_tokens(&page, &c.player_init_marker).ok_or(FetchError::TokensNotFound { video_id })?;
    let body = self.fetch_video_metadata(video_id, &tokens).await?;
    parse_video_metadata(&body, &c.english_language_code)
  }

  async fn download_thumbnail(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let bytes = self.http.get(url).send().await?.error_for_status()?.bytes().await?;
    Ok(bytes.to_vec())
  }
}
