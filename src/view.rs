//! Live filtered subsets of the entry collection.
//!
//! Each view subscribes to exactly the entries it currently holds, through an
//! [`ObserverRegistry`] keyed by entry identity. Dropping an entry from a view
//! always detaches its subscription, so the registry never outgrows the views.

use std::collections::HashMap;

use crate::collection::EntryCollection;
use crate::entry::{Entry, EntryKey};

/// Which predicate a view applies. Modes are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
  /// Pass-through: every entry.
  #[default]
  All,
  /// Subtitled and not yet dealt with.
  Interesting,
  /// Still waiting for subtitles.
  Active,
}

impl FilterMode {
  pub fn matches(self, entry: &Entry) -> bool {
    match self {
      FilterMode::All => true,
      FilterMode::Interesting => entry.has_english_subs() && !entry.is_watched() && !entry.is_ignored(),
      FilterMode::Active => !entry.has_english_subs() && !entry.is_ignored() && !entry.is_watched(),
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      FilterMode::All => "all",
      FilterMode::Interesting => "interesting",
      FilterMode::Active => "active",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(usize);

/// Subscriptions of views to individual entries.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
  by_entry: HashMap<EntryKey, Vec<ViewId>>,
}

impl ObserverRegistry {
  pub fn subscribe(&mut self, key: EntryKey, view: ViewId) {
    let observers = self.by_entry.entry(key).or_default();
    if !observers.contains(&view) {
      observers.push(view);
    }
  }

  pub fn unsubscribe(&mut self, key: &EntryKey, view: ViewId) -> bool {
    let Some(observers) = self.by_entry.get_mut(key) else { return false };
    let before = observers.len();
    observers.retain(|v| *v != view);
    let removed = observers.len() != before;
    if observers.is_empty() {
      self.by_entry.remove(key);
    }
    removed
  }

  pub fn observers(&self, key: &EntryKey) -> &[ViewId] {
    self.by_entry.get(key).map(Vec::as_slice).unwrap_or_default()
  }

  /// Total number of live subscriptions.
  pub fn len(&self) -> usize {
    self.by_entry.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.by_entry.is_empty()
  }
}

/// An ordered, predicate-selected projection of the collection.
#[derive(Debug)]
pub struct FilteredView {
  name: String,
  mode: FilterMode,
  members: Vec<EntryKey>,
}

impl FilteredView {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn mode(&self) -> FilterMode {
    self.mode
  }

  pub fn is_interesting(&self) -> bool {
    self.mode == FilterMode::Interesting
  }

  pub fn is_active(&self) -> bool {
    self.mode == FilterMode::Active
  }

  /// Member keys, in the relative order of the base collection.
  pub fn keys(&self) -> &[EntryKey] {
    &self.members
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }
}

#[derive(Debug, Default)]
pub struct ViewMaintainer {
  views: Vec<FilteredView>,
  registry: ObserverRegistry,
}

impl ViewMaintainer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_view(&mut self, name: &str, mode: FilterMode, entries: &EntryCollection) -> ViewId {
    let id = ViewId(self.views.len());
    self.views.push(FilteredView { name: name.to_string(), mode, members: Vec::new() });
    self.rebuild(id, entries);
    id
  }

  pub fn view(&self, id: ViewId) -> &FilteredView {
    &self.views[id.0]
  }

  pub fn find(&self, name: &str) -> Option<ViewId> {
    self.views.iter().position(|v| v.name == name).map(ViewId)
  }

  pub fn registry(&self) -> &ObserverRegistry {
    &self.registry
  }

  /// A new entry was appended to the base collection.
  pub fn on_inserted(&mut self, entry: &Entry) {
    let key = entry.key();
    for (i, view) in self.views.iter_mut().enumerate() {
      if view.mode.matches(entry) && !view.members.contains(&key) {
        view.members.push(key);
        self.registry.subscribe(key, ViewId(i));
      }
    }
  }

  /// A member entry changed: views whose predicate no longer holds drop it and unsubscribe.
  pub fn on_changed(&mut self, entry: &Entry) {
    let key = entry.key();
    let observers = self.registry.observers(&key).to_vec();
    for id in observers {
      let view = &mut self.views[id.0];
      if !view.mode.matches(entry) {
        view.members.retain(|k| *k != key);
        self.registry.unsubscribe(&key, id);
      }
    }
  }

  /// Switch a view's predicate and recompute it from scratch.
  pub fn set_mode(&mut self, id: ViewId, mode: FilterMode, entries: &EntryCollection) {
    self.views[id.0].mode = mode;
    self.rebuild(id, entries);
  }

  /// Toggle the "interesting" predicate. Turning it on replaces "active"; turning
  /// it off falls back to pass-through. The view is always rebuilt.
  pub fn set_interesting(&mut self, id: ViewId, on: bool, entries: &EntryCollection) {
    let mode = toggled(self.views[id.0].mode, FilterMode::Interesting, on);
    self.set_mode(id, mode, entries);
  }

  pub fn set_active(&mut self, id: ViewId, on: bool, entries: &EntryCollection) {
    let mode = toggled(self.views[id.0].mode, FilterMode::Active, on);
    self.set_mode(id, mode, entries);
  }

  fn rebuild(&mut self, id: ViewId, entries: &EntryCollection) {
    let view = &mut self.views[id.0];
    for key in view.members.drain(..) {
      self.registry.unsubscribe(&key, id);
    }
    let mode = view.mode;
    for entry in entries.iter().filter(|e| mode.matches(e)) {
      view.members.push(entry.key());
      self.registry.subscribe(entry.key(), id);
    }
  }
}

fn toggled(current: FilterMode, target: FilterMode, on: bool) -> FilterMode {
  match (on, current == target) {
    (true, _) => target,
    (false, true) => FilterMode::All,
    (false, false) => current,
  }
}
