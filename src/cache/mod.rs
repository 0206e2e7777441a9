//! Feed cache
//!
//! - **KeyValueCache**: typed access to a TTL key-value store with metadata
//! - **FreshnessWindow**: fresh / stale / miss classification of stored records
//! - **FeedCacheEngine**: stale-while-revalidate reads for one feed
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! fresh_ttl_seconds = 7200
//! hard_ttl_seconds = 7260
//! config_ttl_seconds = 86400
//! generation_timeout_seconds = 120
//! ```

mod clock;
mod engine;
mod freshness;
mod inflight;
mod kv;
mod lock;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    CacheStatus, CachedResult, EngineConfig, EngineDeps, EngineError, FeedCacheEngine,
    METRIC_FEED_HIT, METRIC_FEED_MISS, METRIC_FEED_STALE, METRIC_GENERATE_MS,
    METRIC_REFRESH_FAILURE, METRIC_REFRESH_SKIPPED, METRIC_REFRESH_SUCCESS, RecordMetadata,
    RefreshHandle, RefreshOutcome,
};
pub use freshness::{CacheDirective, Freshness, FreshnessWindow, Lookup, WindowError};
pub use inflight::{InFlightError, InFlightRefreshes, RefreshGuard};
pub use kv::{KeyValueCache, KvStore, PutOptions, StoreError, StoredValue};
pub use memory::MemoryKvStore;
