/*!
 * Translation caching functionality.
 *
 * Finished translations are kept per `(video, source, target)` in the
 * persistent store so that asking for the same video twice never hits the
 * network. The cache is bounded: when it grows past its capacity the
 * entries with the oldest `lastAccess` are evicted.
 */

use anyhow::Result;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::database::store::{self, KeyValueStore, CACHE_KEY};
use crate::subtitle_processor::TranslatedSubtitle;

/// Maximum number of cached videos
pub const CACHE_CAPACITY: usize = 100;

/// Layout version of the persisted document
pub const CACHE_VERSION: u32 = 1;

/// Key under which one translation is stored
pub fn cache_key(video_id: &str, source_language: &str, target_language: &str) -> String {
    format!("{}_{}_{}", video_id, source_language, target_language)
}

/// One cached translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub translations: Vec<TranslatedSubtitle>,
    /// Milliseconds since the epoch
    pub created_at: i64,
    /// Milliseconds since the epoch, strictly increasing across touches
    pub last_access: i64,
}

fn default_version() -> u32 {
    CACHE_VERSION
}

/// The persisted cache document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheDocument {
    /// Next access stamp, later than every stamp already in the document
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let newest = self.entries.values().map(|e| e.last_access).max().unwrap_or(i64::MIN);
        now.max(newest.saturating_add(1))
    }

    /// Drop least recently used entries until at most `capacity` remain
    fn evict_to(&mut self, capacity: usize) -> usize {
        if self.entries.len() <= capacity {
            return 0;
        }

        let mut by_age: Vec<(i64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.last_access, key.clone()))
            .collect();
        by_age.sort_by_key(|(last_access, _)| *last_access);

        let excess = self.entries.len() - capacity;
        for (_, key) in by_age.into_iter().take(excess) {
            debug!("Evicting cached translation {}", key);
            self.entries.remove(&key);
        }
        excess
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    /// Hits since this process started or the cache was cleared
    pub hits: u64,
    pub misses: u64,
    pub oldest_access: Option<i64>,
    pub newest_access: Option<i64>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

/// Bounded LRU translation cache over the persistent store
pub struct TranslationCache {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
    /// Serializes read-modify-write cycles on the document
    write_lock: tokio::sync::Mutex<()>,
    counters: Mutex<Counters>,
}

impl TranslationCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, CACHE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            write_lock: tokio::sync::Mutex::new(()),
            counters: Mutex::new(Counters::default()),
        }
    }

    async fn load_document(&self) -> Result<CacheDocument> {
        match store::load::<CacheDocument>(self.store.as_ref(), CACHE_KEY).await {
            Ok(document) => Ok(document.unwrap_or_default()),
            Err(e) if e.downcast_ref::<serde_json::Error>().is_some() => {
                warn!("Discarding unreadable translation cache: {:#}", e);
                Ok(CacheDocument::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a translation and mark it as recently used
    pub async fn get(
        &self,
        video_id: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Option<Vec<TranslatedSubtitle>>> {
        let key = cache_key(video_id, source_language, target_language);
        let _guard = self.write_lock.lock().await;
        let mut document = self.load_document().await?;

        let stamp = document.next_stamp();
        let Some(entry) = document.entries.get_mut(&key) else {
            self.counters.lock().misses += 1;
            debug!("Cache miss for {}", key);
            return Ok(None);
        };

        entry.last_access = stamp;
        let translations = entry.translations.clone();
        store::save(self.store.as_ref(), CACHE_KEY, &document).await?;

        self.counters.lock().hits += 1;
        debug!("Cache hit for {} ({} subtitles)", key, translations.len());
        Ok(Some(translations))
    }

    /// Insert or overwrite a translation, then evict beyond capacity
    pub async fn put(
        &self,
        video_id: &str,
        source_language: &str,
        target_language: &str,
        translations: &[TranslatedSubtitle],
    ) -> Result<()> {
        let key = cache_key(video_id, source_language, target_language);
        let _guard = self.write_lock.lock().await;
        let mut document = self.load_document().await?;

        let stamp = document.next_stamp();
        document.version = CACHE_VERSION;
        document.entries.insert(
            key.clone(),
            CacheEntry {
                translations: translations.to_vec(),
                created_at: chrono::Utc::now().timestamp_millis(),
                last_access: stamp,
            },
        );

        let evicted = document.evict_to(self.capacity);
        store::save(self.store.as_ref(), CACHE_KEY, &document).await?;

        debug!("Cached {} subtitles for {} (evicted {})", translations.len(), key, evicted);
        Ok(())
    }

    /// Remove every cached translation
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(CACHE_KEY).await?;
        *self.counters.lock() = Counters::default();
        debug!("Translation cache cleared");
        Ok(())
    }

    /// Get cache statistics
    pub async fn stats(&self) -> Result<CacheStats> {
        let document = self.load_document().await?;
        let counters = self.counters.lock();

        Ok(CacheStats {
            entries: document.entries.len(),
            capacity: self.capacity,
            hits: counters.hits,
            misses: counters.misses,
            oldest_access: document.entries.values().map(|e| e.last_access).min(),
            newest_access: document.entries.values().map(|e| e.last_access).max(),
        })
    }

    /// Cached keys from least to most recently used
    pub async fn keys_by_recency(&self) -> Result<Vec<String>> {
        let document = self.load_document().await?;
        let mut keys: Vec<(i64, String)> = document
            .entries
            .into_iter()
            .map(|(key, entry)| (entry.last_access, key))
            .collect();
        keys.sort_by_key(|(last_access, _)| *last_access);
        Ok(keys.into_iter().map(|(_, key)| key).collect())
    }
}
