//! Durable key/value store boundary.
//!
//! The engine persists through this trait: a crash-surviving map from
//! string keys to typed values with atomic multi-key commit. Two
//! implementations ship with the crate, an in-memory one for tests and
//! ephemeral use, and a JSON-file-backed one whose writes go through an
//! atomic rename so a crash mid-commit leaves the previous state intact.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use geofence_core::DataValue;

use crate::error::StoreResult;

/// A value the store can hold: one of the five supported scalar kinds, or
/// a set of strings (used for id-sets and key-sets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoreValue {
    Scalar(DataValue),
    StringSet(BTreeSet<String>),
}

impl StoreValue {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&DataValue> {
        match self {
            StoreValue::Scalar(v) => Some(v),
            StoreValue::StringSet(_) => None,
        }
    }

    #[must_use]
    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            StoreValue::StringSet(s) => Some(s),
            StoreValue::Scalar(_) => None,
        }
    }
}

impl From<DataValue> for StoreValue {
    fn from(value: DataValue) -> Self {
        StoreValue::Scalar(value)
    }
}

/// An ordered set of mutations applied atomically: deletes first, then
/// puts. After a successful apply the whole batch is durable; a crash
/// mid-apply must leave the pre-batch state observable.
#[derive(Debug, Default)]
pub struct WriteBatch {
    deletes: Vec<String>,
    puts: Vec<(String, StoreValue)>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<StoreValue>) -> &mut Self {
        self.puts.push((key.into(), value.into()));
        self
    }

    pub fn delete(&mut self, key: impl Into<String>) -> &mut Self {
        self.deletes.push(key.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    /// Apply the batch to a plain map. Shared by the in-process backends.
    fn apply_to(self, map: &mut HashMap<String, StoreValue>) {
        for key in self.deletes {
            map.remove(&key);
        }
        for (key, value) in self.puts {
            map.insert(key, value);
        }
    }
}

/// The persistent store boundary consumed by the engine.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a single value.
    async fn get(&self, key: &str) -> StoreResult<Option<StoreValue>>;

    /// Atomically apply a batch of deletes and puts.
    async fn apply(&self, batch: WriteBatch) -> StoreResult<()>;
}

/// In-memory store. Not durable; intended for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, StoreValue>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoreValue>> {
        let map = self
            .map
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(map.get(key).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut map = self
            .map
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        batch.apply_to(&mut map);
        Ok(())
    }
}

/// JSON-file-backed store.
///
/// The whole map is kept in memory and rewritten on every apply: the new
/// contents go to a sibling temp file which is then renamed over the
/// target, so the file on disk is always a complete, parseable snapshot.
/// A missing file opens as an empty store; an unparseable one is an error.
pub struct JsonFileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, StoreValue>>,
}

impl JsonFileStore {
    /// Open or create a store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let map = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file absent, starting empty");
                HashMap::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(map),
        })
    }

    async fn persist(&self, map: &HashMap<String, StoreValue>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        // The temp file must hit disk before the rename makes it the
        // current snapshot, or a power loss could surface a truncated file.
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoreValue>> {
        let map = self.state.lock().await;
        Ok(map.get(key).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut map = self.state.lock().await;
        // Stage on a copy so a failed persist leaves memory matching disk.
        let mut staged = map.clone();
        batch.apply_to(&mut staged);
        self.persist(&staged).await?;
        *map = staged;
        Ok(())
    }
}
