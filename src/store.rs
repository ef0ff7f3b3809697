//! Persisted keyed record stores for entries.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::entry::{Entry, EntryKey};
use crate::error::StoreError;

/// A simple keyed record store. Records are keyed by [`EntryKey`]; deduplication is
/// the reconciler's job, not the store's.
pub trait EntryStore: Send {
  /// All records, in insertion order.
  fn load_all(&mut self) -> Result<Vec<Entry>, StoreError>;

  fn insert(&mut self, entry: &Entry) -> Result<(), StoreError>;

  fn insert_bulk(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
    entries.iter().try_for_each(|e| self.insert(e))
  }

  /// Replace the record with the same key. Unknown keys are ignored.
  fn update(&mut self, entry: &Entry) -> Result<(), StoreError>;
}

/// Non-persistent store, used for dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
  records: Vec<Entry>,
  pub(crate) writes: usize,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_records(records: Vec<Entry>) -> Self {
    Self { records, writes: 0 }
  }

  pub fn records(&self) -> &[Entry] {
    &self.records
  }
}

fn replace_record(records: &mut [Entry], entry: &Entry) -> bool {
  match records.iter_mut().find(|r| r.key() == entry.key()) {
    Some(record) => {
      *record = entry.clone();
      true
    }
    None => false,
  }
}

impl EntryStore for MemoryStore {
  fn load_all(&mut self) -> Result<Vec<Entry>, StoreError> {
    Ok(self.records.clone())
  }

  fn insert(&mut self, entry: &Entry) -> Result<(), StoreError> {
    self.records.push(entry.clone());
    self.writes += 1;
    Ok(())
  }

  fn insert_bulk(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
    self.records.extend_from_slice(entries);
    self.writes += 1;
    Ok(())
  }

  fn update(&mut self, entry: &Entry) -> Result<(), StoreError> {
    if replace_record(&mut self.records, entry) {
      self.writes += 1;
    }
    Ok(())
  }
}

/// JSON array of records on disk. Every mutation rewrites the file through a
/// temporary sibling and a rename, so a crash never leaves a truncated store.
#[derive(Debug)]
pub struct JsonFileStore {
  path: PathBuf,
  records: Vec<Entry>,
}

impl JsonFileStore {
  /// Open the store at `path`. A missing file is an empty store.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let path = path.as_ref().to_path_buf();
    let records = match std::fs::read_to_string(&path) {
      Ok(content) if content.trim().is_empty() => Vec::new(),
      Ok(content) => serde_json::from_str(&content)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
      Err(e) => return Err(e.into()),
    };
    debug!(path = %path.display(), records = records.len(), "store: opened");
    Ok(Self { path, records })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn contains(&self, key: EntryKey) -> bool {
    self.records.iter().any(|r| r.key() == key)
  }

  fn flush(&self) -> Result<(), StoreError> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let tmp_path = self.path.with_extension("json.part");
    let content = serde_json::to_vec_pretty(&self.records)?;
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, &self.path)?;
    Ok(())
  }
}

impl EntryStore for JsonFileStore {
  fn load_all(&mut self) -> Result<Vec<Entry>, StoreError> {
    Ok(self.records.clone())
  }

  fn insert(&mut self, entry: &Entry) -> Result<(), StoreError> {
    self.insert_bulk(std::slice::from_ref(entry))
  }

  fn insert_bulk(&mut self, entries: &[Entry]) -> Result<(), StoreError> {
    for entry in entries {
      if !replace_record(&mut self.records, entry) {
        self.records.push(entry.clone());
      }
    }
    self.flush()
  }

  fn update(&mut self, entry: &Entry) -> Result<(), StoreError> {
    if !self.contains(entry.key()) {
      return Ok(());
    }
    replace_record(&mut self.records, entry);
    self.flush()
  }
}
