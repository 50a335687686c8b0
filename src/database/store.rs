/*!
 * Persistent key-value store.
 *
 * The core keeps three JSON documents: the configuration, the translation
 * cache and the queue. `KeyValueStore` is the seam; `SqliteStore` persists
 * to disk and `MemoryStore` lives for the process only.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use super::connection::DatabaseConnection;

/// Key of the stored configuration document
pub const CONFIG_KEY: &str = "config";

/// Key of the translation cache document
pub const CACHE_KEY: &str = "translationCache";

/// Key of the queue document
pub const QUEUE_KEY: &str = "translationQueue";

/// Asynchronous JSON document store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a document, `None` if the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a document, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete a document; missing keys are not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a document
pub async fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let parsed = serde_json::from_value(value)
                .with_context(|| format!("Stored document '{}' has an unexpected shape", key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Serialize and write a document
pub async fn save<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)
        .with_context(|| format!("Failed to serialize document '{}'", key))?;
    store.set(key, value).await
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Open (or create) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new(path)?))
    }

    /// Open the database at the default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_default()?))
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.db
            .read_document(key)
            .await?
            .map(|text| serde_json::from_str(&text).context("Stored value is not valid JSON"))
            .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let text = serde_json::to_string(&value)?;
        debug!("Writing '{}' ({} bytes)", key, text.len());
        self.db.write_document(key, text).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if !self.db.delete_document(key).await? {
            debug!("Nothing stored under '{}'", key);
        }
        Ok(())
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}
