//! Key-value storage seam and its typed wrapper.
//!
//! [`KvStore`] is the raw backend contract: UTF-8 values with a TTL and an
//! optional JSON metadata blob written atomically alongside the value.
//! [`KeyValueCache`] layers JSON encoding and logging on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value backend error: {0}")]
    Backend(String),
    #[error("ttl for `{key}` must be greater than zero")]
    InvalidTtl { key: String },
    #[error("failed to encode value for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Write options for a single `put`.
#[derive(Debug, Clone)]
pub struct PutOptions {
    pub ttl: Duration,
    pub metadata: Option<Value>,
}

impl PutOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            metadata: None,
        }
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A value read together with the metadata stored next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: String,
    pub metadata: Option<Value>,
}

/// Raw TTL key-value backend.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn get_with_metadata(&self, key: &str) -> Result<Option<StoredValue>, StoreError>;

    async fn put(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed facade over a [`KvStore`].
#[derive(Clone)]
pub struct KeyValueCache {
    store: Arc<dyn KvStore>,
}

impl KeyValueCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Read and decode a value.
    ///
    /// Values that are not valid JSON are offered to `T` as a plain JSON
    /// string, so `get::<String>` returns raw text stored by [`Self::put_text`].
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        debug!(cache_key = key, "cache get");
        let Some(raw) = self.store.get(key).await? else {
            debug!(cache_key = key, outcome = "absent", "cache get");
            return Ok(None);
        };
        debug!(cache_key = key, outcome = "hit", "cache get");
        Ok(decode_value(key, raw))
    }

    pub async fn get_text(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get(key).await
    }

    /// Read only the metadata stored with `key`.
    pub async fn get_metadata<M: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<M>, StoreError> {
        let stored = self.store.get_with_metadata(key).await?;
        Ok(stored.and_then(|stored| decode_metadata(key, stored.metadata)))
    }

    /// Read raw text plus decoded metadata in one backend call.
    pub async fn get_text_with_metadata<M: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<(String, Option<M>)>, StoreError> {
        let stored = self.store.get_with_metadata(key).await?;
        Ok(stored.map(|stored| {
            let metadata = decode_metadata(key, stored.metadata);
            (stored.value, metadata)
        }))
    }

    /// Store a value; strings are written verbatim, everything else as JSON.
    pub async fn put<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: PutOptions,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let serialized = match encoded {
            Value::String(text) => text,
            other => other.to_string(),
        };
        self.write(key, serialized, options).await
    }

    pub async fn put_text(
        &self,
        key: &str,
        value: &str,
        options: PutOptions,
    ) -> Result<(), StoreError> {
        self.write(key, value.to_string(), options).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(cache_key = key, "cache delete");
        self.store.delete(key).await?;
        debug!(cache_key = key, "cache entry deleted");
        Ok(())
    }

    async fn write(&self, key: &str, value: String, options: PutOptions) -> Result<(), StoreError> {
        debug!(
            cache_key = key,
            bytes = value.len(),
            ttl_seconds = options.ttl.as_secs(),
            has_metadata = options.metadata.is_some(),
            "cache put"
        );
        self.store.put(key, value, options).await?;
        debug!(cache_key = key, "cache entry stored");
        Ok(())
    }
}

fn decode_value<T: DeserializeOwned>(key: &str, raw: String) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(&raw) {
        return Some(value);
    }
    match serde_json::from_value::<T>(Value::String(raw)) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(cache_key = key, error = %err, "cached value does not match requested type");
            None
        }
    }
}

fn decode_metadata<M: DeserializeOwned>(key: &str, metadata: Option<Value>) -> Option<M> {
    let metadata = metadata?;
    match serde_json::from_value::<M>(metadata) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            warn!(cache_key = key, error = %err, "ignoring undecodable cache metadata");
            None
        }
    }
}
