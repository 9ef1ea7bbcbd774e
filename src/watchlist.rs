//! Watchlist of starred coin ids, persisted through a key-value store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::WATCHLIST_KEY;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// String-keyed, string-valued persistent storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn clear(&mut self, key: &str) -> Result<()>;
}

/// A single JSON object file holding every key. Writes go through a sibling
/// temp file and a rename, so a crash never leaves a half-written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                AppError::Persistence(format!("{} is not a JSON object of strings: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        // A corrupt file is replaced rather than blocking every write.
        let mut map = self.read_all().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.write_all(&map)
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        let mut map = self.read_all().unwrap_or_default();
        if map.remove(key).is_some() {
            self.write_all(&map)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

/// Set of coin ids. Stored as a JSON array of strings under `WATCHLIST_KEY`;
/// every mutation is written through before it returns.
pub struct Watchlist<S: KeyValueStore> {
    store: S,
    ids: BTreeSet<String>,
}

impl<S: KeyValueStore> Watchlist<S> {
    /// Missing, unreadable, or malformed stored data loads as an empty list.
    pub fn load(store: S) -> Self {
        let ids = match store.get(WATCHLIST_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(list) => list.into_iter().filter(|id| !id.trim().is_empty()).collect(),
                Err(e) => {
                    warn!(error = %e, "stored watchlist is malformed, starting empty");
                    BTreeSet::new()
                }
            },
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(error = %e, "could not read watchlist, starting empty");
                BTreeSet::new()
            }
        };
        Self { store, ids }
    }

    fn persist(&mut self) -> Result<()> {
        let list: Vec<&String> = self.ids.iter().collect();
        let raw = serde_json::to_string(&list)?;
        self.store.set(WATCHLIST_KEY, &raw)
    }

    /// Adds `id`; returns false if it was already present.
    pub fn add(&mut self, id: &str) -> Result<bool> {
        if !self.ids.insert(id.to_string()) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Removes `id`; returns false if it was not present.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if !self.ids.remove(id) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Flips membership and returns whether `id` is now watched.
    pub fn toggle(&mut self, id: &str) -> Result<bool> {
        if self.contains(id) {
            self.remove(id)?;
            Ok(false)
        } else {
            self.add(id)?;
            Ok(true)
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn list(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.ids.clear();
        self.store.clear(WATCHLIST_KEY)
    }

    pub fn into_store(self) -> S {
        self.store
    }
}
