//! Stale-while-revalidate engine for a single feed.
//!
//! Every read classifies the stored record against the engine's
//! [`FreshnessWindow`]:
//! - fresh records are served untouched
//! - stale records are served and regenerated once in the background
//! - misses regenerate synchronously before answering
//!
//! Records are written with `ttl = hard_ttl` and `{"timestamp": <ms>}`
//! metadata taken when the content was generated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::freshness::{CacheDirective, Freshness, FreshnessWindow, Lookup};
use super::inflight::InFlightRefreshes;
use super::kv::{KeyValueCache, PutOptions, StoreError};
use crate::feed::{ContentGenerator, GenerateError};

pub const METRIC_FEED_HIT: &str = "rss_translator_feed_hit_total";
pub const METRIC_FEED_MISS: &str = "rss_translator_feed_miss_total";
pub const METRIC_FEED_STALE: &str = "rss_translator_feed_stale_total";
pub const METRIC_REFRESH_SUCCESS: &str = "rss_translator_feed_refresh_success_total";
pub const METRIC_REFRESH_FAILURE: &str = "rss_translator_feed_refresh_failure_total";
pub const METRIC_REFRESH_SKIPPED: &str = "rss_translator_feed_refresh_skipped_total";
pub const METRIC_GENERATE_MS: &str = "rss_translator_generate_ms";

/// Metadata stored next to every feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Epoch milliseconds at which the content was generated.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error("feed cache unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Content served for one read.
#[derive(Debug)]
pub struct CachedResult {
    pub content: String,
    pub status: CacheStatus,
    pub directive: CacheDirective,
    /// Set when this read scheduled a background regeneration.
    pub background_refresh: Option<RefreshHandle>,
    /// Stale read whose regeneration was already running elsewhere.
    pub refresh_skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    Failed(String),
}

/// A detached background regeneration.
///
/// Dropping the handle leaves the task running.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<RefreshOutcome>,
}

impl RefreshHandle {
    pub async fn join(self) -> RefreshOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => RefreshOutcome::Failed(format!("refresh task did not complete: {err}")),
        }
    }
}

/// Thresholds applied by one engine.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub window: FreshnessWindow,
    pub generation_timeout: Duration,
}

/// Collaborators shared by every engine in a registry.
#[derive(Clone)]
pub struct EngineDeps {
    pub cache: KeyValueCache,
    pub clock: Arc<dyn Clock>,
    pub refreshes: InFlightRefreshes,
}

#[derive(Clone)]
struct Pipeline {
    feed: String,
    key: String,
    config: EngineConfig,
    cache: KeyValueCache,
    generator: ContentGenerator,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    async fn generate(&self) -> Result<String, GenerateError> {
        let started_at = Instant::now();
        let result = tokio::time::timeout(self.config.generation_timeout, self.generator.generate())
            .await
            .unwrap_or(Err(GenerateError::Timeout(self.config.generation_timeout)));
        histogram!(METRIC_GENERATE_MS, "feed" => self.feed.clone())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn store(&self, content: &str) -> Result<(), StoreError> {
        let metadata = RecordMetadata {
            timestamp: self.clock.now_millis(),
        };
        let metadata = serde_json::to_value(metadata).map_err(|source| StoreError::Encode {
            key: self.key.clone(),
            source,
        })?;
        self.cache
            .put_text(
                &self.key,
                content,
                PutOptions::with_ttl(self.config.window.hard_ttl()).metadata(metadata),
            )
            .await
    }

    async fn refresh(&self) -> RefreshOutcome {
        let content = match self.generate().await {
            Ok(content) => content,
            Err(err) => {
                counter!(METRIC_REFRESH_FAILURE, "feed" => self.feed.clone()).increment(1);
                warn!(
                    target = "rss_translator::cache::engine",
                    feed = %self.feed,
                    cache_key = %self.key,
                    kind = err.kind(),
                    error = %err,
                    "background refresh failed, keeping stale content"
                );
                return RefreshOutcome::Failed(err.to_string());
            }
        };

        if let Err(err) = self.store(&content).await {
            counter!(METRIC_REFRESH_FAILURE, "feed" => self.feed.clone()).increment(1);
            warn!(
                target = "rss_translator::cache::engine",
                feed = %self.feed,
                cache_key = %self.key,
                error = %err,
                "background refresh could not store content"
            );
            return RefreshOutcome::Failed(err.to_string());
        }

        counter!(METRIC_REFRESH_SUCCESS, "feed" => self.feed.clone()).increment(1);
        info!(
            target = "rss_translator::cache::engine",
            feed = %self.feed,
            cache_key = %self.key,
            bytes = content.len(),
            "background refresh stored new content"
        );
        RefreshOutcome::Refreshed
    }
}

/// Serves one feed from the cache and keeps it warm.
pub struct FeedCacheEngine {
    pipeline: Pipeline,
    refreshes: InFlightRefreshes,
}

impl FeedCacheEngine {
    pub fn new(
        name: &str,
        generator: ContentGenerator,
        deps: EngineDeps,
        config: EngineConfig,
    ) -> Self {
        Self {
            pipeline: Pipeline {
                feed: name.to_string(),
                key: Self::cache_key(name),
                config,
                cache: deps.cache,
                generator,
                clock: deps.clock,
            },
            refreshes: deps.refreshes,
        }
    }

    /// `feed:<lowercased name>`
    pub fn cache_key(name: &str) -> String {
        format!("feed:{}", name.to_lowercase())
    }

    pub fn name(&self) -> &str {
        &self.pipeline.feed
    }

    pub fn key(&self) -> &str {
        &self.pipeline.key
    }

    pub fn directive(&self) -> CacheDirective {
        self.pipeline.config.window.directive()
    }

    /// Current content for this feed.
    ///
    /// Generation errors surface only when nothing servable is cached.
    pub async fn resolve(&self) -> Result<CachedResult, EngineError> {
        let pipeline = &self.pipeline;
        let record = pipeline
            .cache
            .get_text_with_metadata::<RecordMetadata>(&pipeline.key)
            .await?;

        let lookup = match &record {
            None => Lookup::Absent,
            Some((_, metadata)) => Lookup::Present {
                stored_at: metadata.map(|metadata| metadata.timestamp),
            },
        };
        let freshness = pipeline
            .config
            .window
            .classify(pipeline.clock.now_millis(), lookup);

        match (freshness, record) {
            (Freshness::Fresh, Some((content, _))) => {
                counter!(METRIC_FEED_HIT, "feed" => pipeline.feed.clone()).increment(1);
                debug!(
                    target = "rss_translator::cache::engine",
                    feed = %pipeline.feed,
                    cache_key = %pipeline.key,
                    state = "fresh",
                    "serving cached feed"
                );
                Ok(self.result(content, CacheStatus::Hit, None))
            }
            (Freshness::Stale, Some((content, _))) => {
                counter!(METRIC_FEED_HIT, "feed" => pipeline.feed.clone()).increment(1);
                counter!(METRIC_FEED_STALE, "feed" => pipeline.feed.clone()).increment(1);
                debug!(
                    target = "rss_translator::cache::engine",
                    feed = %pipeline.feed,
                    cache_key = %pipeline.key,
                    state = "stale",
                    "serving stale feed"
                );
                let mut result = self.result(content, CacheStatus::Hit, self.spawn_refresh());
                result.refresh_skipped = result.background_refresh.is_none();
                Ok(result)
            }
            _ => {
                counter!(METRIC_FEED_MISS, "feed" => pipeline.feed.clone()).increment(1);
                info!(
                    target = "rss_translator::cache::engine",
                    feed = %pipeline.feed,
                    cache_key = %pipeline.key,
                    state = "miss",
                    "generating feed"
                );
                let content = pipeline.generate().await?;
                if let Err(err) = pipeline.store(&content).await {
                    warn!(
                        target = "rss_translator::cache::engine",
                        feed = %pipeline.feed,
                        cache_key = %pipeline.key,
                        error = %err,
                        "failed to store generated feed"
                    );
                }
                Ok(self.result(content, CacheStatus::Miss, None))
            }
        }
    }

    fn result(
        &self,
        content: String,
        status: CacheStatus,
        background_refresh: Option<RefreshHandle>,
    ) -> CachedResult {
        CachedResult {
            content,
            status,
            directive: self.directive(),
            background_refresh,
            refresh_skipped: false,
        }
    }

    fn spawn_refresh(&self) -> Option<RefreshHandle> {
        let guard = match self.refreshes.acquire(&self.pipeline.key) {
            Ok(guard) => guard,
            Err(err) => {
                counter!(METRIC_REFRESH_SKIPPED, "feed" => self.pipeline.feed.clone())
                    .increment(1);
                debug!(
                    target = "rss_translator::cache::engine",
                    feed = %self.pipeline.feed,
                    reason = %err,
                    "background refresh skipped"
                );
                return None;
            }
        };

        let pipeline = self.pipeline.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            pipeline.refresh().await
        });
        Some(RefreshHandle { task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::memory::MemoryKvStore;
    use crate::feed::testing::ScriptedSource;

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        engine: FeedCacheEngine,
        source: Arc<ScriptedSource>,
        clock: Arc<ManualClock>,
        cache: KeyValueCache,
    }

    fn fixture_with(source: Arc<ScriptedSource>, generation_timeout: Duration) -> Fixture {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = KeyValueCache::new(Arc::new(MemoryKvStore::with_capacity(16, clock.clone())));
        let window = FreshnessWindow::new(Duration::from_secs(7200), Duration::from_secs(7260))
            .expect("window");
        let engine = FeedCacheEngine::new(
            "HN",
            ContentGenerator::new(source.clone()),
            EngineDeps {
                cache: cache.clone(),
                clock: clock.clone(),
                refreshes: InFlightRefreshes::new(),
            },
            EngineConfig {
                window,
                generation_timeout,
            },
        );
        Fixture {
            engine,
            source,
            clock,
            cache,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedSource::ok("<rss>v1</rss>"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn miss_generates_and_stores_with_timestamp() {
        let fx = fixture();
        assert_eq!(fx.engine.key(), "feed:hn");

        let result = fx.engine.resolve().await.expect("resolve");
        assert_eq!(result.status, CacheStatus::Miss);
        assert_eq!(result.content, "<rss>v1</rss>");
        assert!(result.background_refresh.is_none());

        let (stored, metadata) = fx
            .cache
            .get_text_with_metadata::<RecordMetadata>("feed:hn")
            .await
            .expect("read")
            .expect("record written");
        assert_eq!(stored, "<rss>v1</rss>");
        assert_eq!(metadata, Some(RecordMetadata { timestamp: T0 }));
    }

    #[tokio::test]
    async fn fresh_hit_has_no_side_effects() {
        let fx = fixture();
        fx.engine.resolve().await.expect("miss");
        fx.clock.advance_secs(7200);

        let result = fx.engine.resolve().await.expect("hit");
        assert_eq!(result.status, CacheStatus::Hit);
        assert!(result.background_refresh.is_none());
        assert_eq!(fx.source.calls(), 1);
    }

    #[tokio::test]
    async fn stale_hit_serves_old_content_and_refreshes_once() {
        let fx = fixture();
        fx.engine.resolve().await.expect("miss");
        fx.source.set_body("<rss>v2</rss>");
        fx.clock.advance_secs(7230);

        let result = fx.engine.resolve().await.expect("stale");
        assert_eq!(result.status, CacheStatus::Hit);
        assert_eq!(result.content, "<rss>v1</rss>");
        let refresh = result.background_refresh.expect("refresh scheduled");
        assert_eq!(refresh.join().await, RefreshOutcome::Refreshed);
        assert_eq!(fx.source.calls(), 2);

        let result = fx.engine.resolve().await.expect("fresh again");
        assert_eq!(result.content, "<rss>v2</rss>");
        assert!(result.background_refresh.is_none());

        let metadata: Option<RecordMetadata> =
            fx.cache.get_metadata("feed:hn").await.expect("meta");
        assert_eq!(
            metadata,
            Some(RecordMetadata {
                timestamp: T0 + 7_230_000
            })
        );
    }

    #[tokio::test]
    async fn concurrent_stale_reads_share_one_refresh() {
        let fx = fixture();
        fx.engine.resolve().await.expect("miss");
        fx.clock.advance_secs(7230);

        let first = fx.engine.resolve().await.expect("stale");
        let second = fx.engine.resolve().await.expect("stale");

        assert!(!first.refresh_skipped);
        let refresh = first.background_refresh.expect("first read refreshes");
        assert!(second.background_refresh.is_none());
        assert!(second.refresh_skipped);
        refresh.join().await;
        assert_eq!(fx.source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_existing_record() {
        let fx = fixture();
        fx.engine.resolve().await.expect("miss");
        fx.source.fail_with("upstream 503");
        fx.clock.advance_secs(7230);

        let result = fx.engine.resolve().await.expect("stale still served");
        assert_eq!(result.content, "<rss>v1</rss>");
        let outcome = result.background_refresh.expect("refresh").join().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(_)));

        let metadata: Option<RecordMetadata> =
            fx.cache.get_metadata("feed:hn").await.expect("meta");
        assert_eq!(metadata, Some(RecordMetadata { timestamp: T0 }));

        // The guard is released after a failure.
        let again = fx.engine.resolve().await.expect("stale");
        assert!(again.background_refresh.is_some());
    }

    #[tokio::test]
    async fn miss_failure_propagates_without_writing() {
        let fx = fixture();
        fx.source.fail_with("connection refused");

        let err = fx.engine.resolve().await.expect_err("miss fails");
        assert!(matches!(
            err,
            EngineError::Generate(GenerateError::SourceUnavailable { .. })
        ));
        assert!(fx.cache.get_text("feed:hn").await.expect("read").is_none());
    }

    #[tokio::test]
    async fn record_without_metadata_is_fresh_forever() {
        let fx = fixture();
        fx.cache
            .put_text(
                "feed:hn",
                "<rss>legacy</rss>",
                PutOptions::with_ttl(Duration::from_secs(100_000)),
            )
            .await
            .expect("seed");
        fx.clock.advance_secs(50_000);

        let result = fx.engine.resolve().await.expect("hit");
        assert_eq!(result.status, CacheStatus::Hit);
        assert_eq!(result.content, "<rss>legacy</rss>");
        assert!(result.background_refresh.is_none());
        assert_eq!(fx.source.calls(), 0);
    }

    #[tokio::test]
    async fn expired_record_is_regenerated_synchronously() {
        let fx = fixture();
        fx.engine.resolve().await.expect("miss");
        fx.source.set_body("<rss>v2</rss>");
        fx.clock.advance_secs(7260);

        let result = fx.engine.resolve().await.expect("miss again");
        assert_eq!(result.status, CacheStatus::Miss);
        assert_eq!(result.content, "<rss>v2</rss>");
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let fx = fixture_with(
            ScriptedSource::slow("<rss/>", Duration::from_secs(5)),
            Duration::from_millis(20),
        );

        let err = fx.engine.resolve().await.expect_err("timeout");
        assert!(matches!(err, EngineError::Generate(GenerateError::Timeout(_))));
        assert!(fx.cache.get_text("feed:hn").await.expect("read").is_none());
    }

    #[test]
    fn directive_and_status_labels() {
        let fx = fixture();
        assert_eq!(
            fx.engine.directive().to_string(),
            "public, max-age=7200, stale-while-revalidate=60"
        );
        assert_eq!(CacheStatus::Hit.as_str(), "HIT");
        assert_eq!(CacheStatus::Miss.as_str(), "MISS");
    }
}
