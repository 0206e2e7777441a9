//! In-process TTL key-value store.
//!
//! Entries expire lazily: an expired entry is dropped the next time it is
//! read. Capacity is bounded with LRU eviction.

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;

use super::clock::Clock;
use super::kv::{KvStore, PutOptions, StoreError, StoredValue};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";

struct Entry {
    value: String,
    metadata: Option<Value>,
    expires_at: i64,
}

pub struct MemoryKvStore {
    entries: RwLock<LruCache<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new(capacity: NonZeroUsize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            clock,
        }
    }

    /// Create a store, clamping a zero capacity to one entry.
    pub fn with_capacity(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            clock,
        )
    }

    /// Number of entries held, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_live(&self, key: &str, op: &'static str) -> Option<StoredValue> {
        let now = self.clock.now_millis();
        let mut entries = rw_write(&self.entries, SOURCE, op);
        match entries.get(key) {
            None => return None,
            Some(entry) if entry.expires_at > now => {
                return Some(StoredValue {
                    value: entry.value.clone(),
                    metadata: entry.metadata.clone(),
                });
            }
            Some(_) => {}
        }
        entries.pop(key);
        None
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_live(key, "get").map(|stored| stored.value))
    }

    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError> {
        Ok(self.read_live(key, "get_with_metadata"))
    }

    async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(options.ttl.as_millis()).unwrap_or(i64::MAX);
        if ttl_ms == 0 {
            return Err(StoreError::InvalidTtl {
                key: key.to_string(),
            });
        }
        let expires_at = self.clock.now_millis().saturating_add(ttl_ms);
        rw_write(&self.entries, SOURCE, "put").put(
            key.to_string(),
            Entry {
                value,
                metadata: options.metadata,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}
