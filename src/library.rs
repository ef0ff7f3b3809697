//! The owner context: the only place entries, views and the store are mutated.
//!
//! Every mutation produces an [`EntryEvent`] which is routed, in order, to the
//! view maintainer and the store. Background thumbnail work hands its results back
//! here through [`Library::apply_finished_thumbnails`] or [`Library::wait_for_thumbnails`].

use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::collection::{EntryCollection, EntryEvent, MergeOutcome};
use crate::entry::{Entry, EntryKey};
use crate::fetcher::VideoSource;
use crate::store::EntryStore;
use crate::thumbnail::{ThumbnailFailure, ThumbnailOutcome, ThumbnailPipeline};
use crate::view::{FilterMode, FilteredView, ViewId, ViewMaintainer};

const SELECTED_VIEW: &str = "selected";

pub struct Library {
  entries: EntryCollection,
  views: ViewMaintainer,
  selected: ViewId,
  store: Box<dyn EntryStore>,
  thumbnails: ThumbnailPipeline,
}

impl Library {
  /// Load every record from `store` and build the default pass-through view.
  pub fn open(mut store: Box<dyn EntryStore>, thumbnail_concurrency: usize) -> Result<Self> {
    let records = store.load_all()?;
    let entries = EntryCollection::from_records(records);
    let mut views = ViewMaintainer::new();
    let selected = views.add_view(SELECTED_VIEW, FilterMode::All, &entries);
    debug!(entries = entries.len(), "library: opened");
    Ok(Self { entries, views, selected, store, thumbnails: ThumbnailPipeline::new(thumbnail_concurrency) })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
    self.entries.get(key)
  }

  pub fn entries(&self) -> impl Iterator<Item = &Entry> {
    self.entries.iter()
  }

  pub fn views(&self) -> &ViewMaintainer {
    &self.views
  }

  pub fn selected_view(&self) -> &FilteredView {
    self.views.view(self.selected)
  }

  /// Entries of the selected view, in collection order.
  pub fn selected(&self) -> impl Iterator<Item = &Entry> {
    self.selected_view().keys().iter().filter_map(|k| self.entries.get(k))
  }

  // --- Reconciliation ---

  /// Reconcile one fetched entry; an insertion is persisted immediately.
  pub fn merge(&mut self, incoming: Entry) -> MergeOutcome {
    let outcome = self.entries.merge(incoming);
    if outcome.inserted
      && let Some(entry) = self.entries.get(&outcome.key)
      && let Err(e) = self.store.insert(entry)
    {
      warn!(key = %outcome.key, err = %e, "store: insert failed");
    }
    if let Some(event) = outcome.event.clone() {
      self.publish(event);
    }
    outcome
  }

  /// Reconcile several entries at once; new ones are persisted in a single bulk insert.
  pub fn merge_batch(&mut self, incoming: Vec<Entry>) -> Vec<MergeOutcome> {
    let outcomes: Vec<MergeOutcome> = incoming.into_iter().map(|e| self.entries.merge(e)).collect();
    let inserted: Vec<Entry> =
      outcomes.iter().filter(|o| o.inserted).filter_map(|o| self.entries.get(&o.key).cloned()).collect();
    if !inserted.is_empty()
      && let Err(e) = self.store.insert_bulk(&inserted)
    {
      warn!(count = inserted.len(), err = %e, "store: bulk insert failed");
    }
    for event in outcomes.iter().filter_map(|o| o.event.clone()) {
      self.publish(event);
    }
    outcomes
  }

  // --- User-side mutations ---

  pub fn set_watched(&mut self, key: &EntryKey, value: bool) -> Result<bool> {
    self.require(key)?;
    Ok(self.entries.set_watched(key, value).map(|e| self.publish(e)).is_some())
  }

  pub fn set_ignored(&mut self, key: &EntryKey, value: bool) -> Result<bool> {
    self.require(key)?;
    Ok(self.entries.set_ignored(key, value).map(|e| self.publish(e)).is_some())
  }

  /// Drop the stored thumbnail so the next sync fetches a fresh one.
  pub fn clear_preview(&mut self, key: &EntryKey) -> Result<bool> {
    self.require(key)?;
    Ok(self.entries.set_preview_image(key, None).map(|e| self.publish(e)).is_some())
  }

  pub fn filter_mode(&self) -> FilterMode {
    self.selected_view().mode()
  }

  pub fn set_filter_mode(&mut self, mode: FilterMode) {
    self.views.set_mode(self.selected, mode, &self.entries);
  }

  pub fn set_interesting(&mut self, on: bool) {
    self.views.set_interesting(self.selected, on, &self.entries);
  }

  pub fn set_active(&mut self, on: bool) {
    self.views.set_active(self.selected, on, &self.entries);
  }

  fn require(&self, key: &EntryKey) -> Result<()> {
    if self.entries.contains(key) { Ok(()) } else { Err(anyhow!("No entry for video {}", key)) }
  }

  // --- Thumbnails ---

  /// The entry exists and still has no preview image.
  pub fn needs_thumbnail(&self, key: &EntryKey) -> bool {
    self.entries.get(key).is_some_and(|e| !e.has_preview())
  }

  pub fn schedule_thumbnail<S: VideoSource>(&mut self, source: &Arc<S>, key: EntryKey, url: &str) -> bool {
    self.thumbnails.schedule(source, key, url)
  }

  pub fn thumbnails_in_flight(&self) -> usize {
    self.thumbnails.in_flight()
  }

  /// Apply every thumbnail result that has already arrived. Returns how many previews were stored.
  pub fn apply_finished_thumbnails(&mut self) -> usize {
    let mut stored = 0;
    for outcome in self.thumbnails.drain_ready() {
      if self.apply_thumbnail(outcome) {
        stored += 1;
      }
    }
    stored
  }

  /// Wait for every in-flight thumbnail and apply the results.
  pub async fn wait_for_thumbnails(&mut self) -> usize {
    let mut stored = 0;
    while let Some(outcome) = self.thumbnails.next_outcome().await {
      if self.apply_thumbnail(outcome) {
        stored += 1;
      }
    }
    stored
  }

  pub fn thumbnail_failures(&self) -> impl Iterator<Item = &ThumbnailFailure> {
    self.thumbnails.failures()
  }

  fn apply_thumbnail(&mut self, outcome: ThumbnailOutcome) -> bool {
    match outcome.result {
      Ok(bytes) => match self.entries.set_preview_image(&outcome.key, Some(bytes)) {
        Some(event) => {
          debug!(key = %outcome.key, "thumbnail: stored");
          self.publish(event);
          true
        }
        None => false,
      },
      Err(error) => {
        self.thumbnails.record_failure(outcome.key, error);
        false
      }
    }
  }

  // --- Event routing ---

  fn publish(&mut self, event: EntryEvent) {
    match event {
      EntryEvent::Inserted(key) => {
        if let Some(entry) = self.entries.get(&key) {
          self.views.on_inserted(entry);
        }
      }
      EntryEvent::Changed { key, .. } => {
        if let Some(entry) = self.entries.get(&key) {
          self.views.on_changed(entry);
          if let Err(e) = self.store.update(entry) {
            warn!(key = %key, err = %e, "store: update failed");
          }
        }
      }
    }
  }
}
