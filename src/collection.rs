use std::collections::HashMap;
use tracing::warn;

use crate::entry::{Entry, EntryField, EntryKey};

/// Something that happened to the collection, published to views and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEvent {
  Inserted(EntryKey),
  Changed { key: EntryKey, fields: Vec<EntryField> },
}

/// Result of reconciling one fetched entry into the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
  pub key: EntryKey,
  /// `true` when the key was new and the entry was appended.
  pub inserted: bool,
  pub event: Option<EntryEvent>,
}

/// Insertion-ordered entries with a keyed index. At most one entry per [`EntryKey`].
#[derive(Debug, Default)]
pub struct EntryCollection {
  entries: Vec<Entry>,
  index: HashMap<EntryKey, usize>,
}

impl EntryCollection {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build from persisted records. Duplicate keys (which a keyed store should never
  /// hold) are folded into the first occurrence.
  pub fn from_records(records: Vec<Entry>) -> Self {
    let mut collection = Self::new();
    for record in records {
      let outcome = collection.merge(record);
      if !outcome.inserted {
        warn!(key = %outcome.key, "store: duplicate record folded into existing entry");
      }
    }
    collection
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, key: &EntryKey) -> Option<&Entry> {
    self.index.get(key).map(|&i| &self.entries[i])
  }

  pub fn contains(&self, key: &EntryKey) -> bool {
    self.index.contains_key(key)
  }

  /// Entries in discovery order.
  pub fn iter(&self) -> impl Iterator<Item = &Entry> {
    self.entries.iter()
  }

  fn get_mut(&mut self, key: &EntryKey) -> Option<&mut Entry> {
    self.index.get(key).map(|&i| &mut self.entries[i])
  }

  /// Reconcile `incoming` against the collection.
  ///
  /// A new key is appended as-is. A known key keeps its existing entry (same slot,
  /// same identity) and only has its sync-owned fields overwritten; the preview image
  /// and the watched/ignored flags are never touched here.
  pub fn merge(&mut self, incoming: Entry) -> MergeOutcome {
    let key = incoming.key();
    match self.get_mut(&key) {
      Some(existing) => {
        let fields = existing.copy_live_data(incoming.info().clone());
        let event = (!fields.is_empty()).then_some(EntryEvent::Changed { key, fields });
        MergeOutcome { key, inserted: false, event }
      }
      None => {
        self.index.insert(key, self.entries.len());
        self.entries.push(incoming);
        MergeOutcome { key, inserted: true, event: Some(EntryEvent::Inserted(key)) }
      }
    }
  }

  pub(crate) fn set_preview_image(&mut self, key: &EntryKey, bytes: Option<Vec<u8>>) -> Option<EntryEvent> {
    self.update(key, EntryField::PreviewImage, |e| e.set_preview_image(bytes))
  }

  pub(crate) fn set_watched(&mut self, key: &EntryKey, value: bool) -> Option<EntryEvent> {
    self.update(key, EntryField::Watched, |e| e.set_watched(value))
  }

  pub(crate) fn set_ignored(&mut self, key: &EntryKey, value: bool) -> Option<EntryEvent> {
    self.update(key, EntryField::Ignored, |e| e.set_ignored(value))
  }

  fn update(&mut self, key: &EntryKey, field: EntryField, apply: impl FnOnce(&mut Entry) -> bool) -> Option<EntryEvent> {
    let entry = self.get_mut(key)?;
    apply(entry).then(|| EntryEvent::Changed { key: *key, fields: vec![field] })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entry::sample_info;

  fn entry(channel_id: u32, video_id: u32, title: &str, subs: bool) -> Entry {
    Entry::new(EntryKey::new(channel_id, video_id), sample_info(title, subs))
  }

  #[test]
  fn merge_new_key_appends_in_discovery_order() {
    let mut c = EntryCollection::new();
    let a = c.merge(entry(1, 10, "a", false));
    let b = c.merge(entry(1, 11, "b", false));
    let d = c.merge(entry(2, 10, "d", false));

    assert!(a.inserted && b.inserted && d.inserted);
    assert_eq!(a.event, Some(EntryEvent::Inserted(EntryKey::new(1, 10))));
    let titles: Vec<&str> = c.iter().map(|e| e.title()).collect();
    assert_eq!(titles, vec!["a", "b", "d"]);
  }

  #[test]
  fn repeated_merges_keep_exactly_one_entry_per_key() {
    let mut c = EntryCollection::new();
    for i in 0..5 {
      c.merge(entry(128, 555, &format!("take {i}"), i % 2 == 0));
    }
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(&EntryKey::new(128, 555)).map(|e| e.title()), Some("take 4"));
  }

  #[test]
  fn merge_preserves_user_fields_and_preview() {
    let key = EntryKey::new(128, 555);
    let mut c = EntryCollection::new();
    c.merge(entry(128, 555, "first", false));
    c.set_watched(&key, true);
    c.set_ignored(&key, true);
    c.set_preview_image(&key, Some(vec![1, 2, 3]));

    let outcome = c.merge(entry(128, 555, "second", true));

    assert!(!outcome.inserted);
    assert_eq!(
      outcome.event,
      Some(EntryEvent::Changed { key, fields: vec![EntryField::Title, EntryField::HasEnglishSubs] })
    );
    let e = c.get(&key).unwrap();
    assert!(e.is_watched());
    assert!(e.is_ignored());
    assert_eq!(e.preview_image(), Some(&[1, 2, 3][..]));
    assert!(e.has_english_subs());
  }

  #[test]
  fn identical_merge_emits_no_event() {
    let mut c = EntryCollection::new();
    c.merge(entry(1, 1, "same", false));
    let outcome = c.merge(entry(1, 1, "same", false));
    assert_eq!(outcome.event, None);
  }

  #[test]
  fn setters_report_changes_only() {
    let key = EntryKey::new(1, 1);
    let mut c = EntryCollection::new();
    c.merge(entry(1, 1, "x", false));

    assert_eq!(c.set_watched(&key, true), Some(EntryEvent::Changed { key, fields: vec![EntryField::Watched] }));
    assert_eq!(c.set_watched(&key, true), None);
    assert_eq!(c.set_ignored(&EntryKey::new(9, 9), true), None, "unknown key");
  }

  #[test]
  fn from_records_folds_duplicates() {
    let c = EntryCollection::from_records(vec![entry(1, 1, "a", false), entry(1, 2, "b", false), entry(1, 1, "c", true)]);
    assert_eq!(c.len(), 2);
    assert_eq!(c.get(&EntryKey::new(1, 1)).map(|e| e.title()), Some("c"));
  }
}
