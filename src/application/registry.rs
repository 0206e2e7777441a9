//! Named feed engines built from the feed catalog.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::catalog::{CatalogError, FeedCatalogSource};
use crate::cache::{
    CachedResult, EngineConfig, EngineDeps, EngineError, FeedCacheEngine, KeyValueCache,
    PutOptions, RefreshOutcome, StoreError,
};
use crate::domain::feeds::{FeedCatalog, FeedDescriptor};
use crate::feed::GeneratorFactory;

/// Cache key of the catalog document.
pub const FEEDS_CONFIG_KEY: &str = "feeds:config";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("feed catalog unavailable: {0}")]
    Catalog(#[from] CatalogError),
    #[error("feed `{0}` not found")]
    FeedNotFound(String),
    #[error("feed `{name}` is configured more than once")]
    DuplicateFeed { name: String },
    #[error("feed configuration cache unavailable: {0}")]
    Cache(#[from] StoreError),
    #[error("feed `{feed}` could not be served: {source}")]
    Engine {
        feed: String,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub engine: EngineConfig,
    pub config_ttl: Duration,
}

/// Result of refreshing one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedRefreshOutcome {
    pub feed: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<&'static str>,
    /// Background refresh status for stale reads: `completed`, `failed`, or
    /// `skipped` when another refresh of the feed was already running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct FeedRegistry {
    cache: KeyValueCache,
    descriptors: Vec<FeedDescriptor>,
    engines: HashMap<String, Arc<FeedCacheEngine>>,
}

impl FeedRegistry {
    /// Load the catalog (cache first) and build one engine per feed.
    pub async fn initialize(
        deps: EngineDeps,
        catalog: &dyn FeedCatalogSource,
        factory: &dyn GeneratorFactory,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        let catalog = load_catalog(&deps.cache, catalog, config.config_ttl).await?;

        let mut engines = HashMap::with_capacity(catalog.feeds.len());
        for descriptor in &catalog.feeds {
            match engines.entry(descriptor.key()) {
                Entry::Occupied(_) => {
                    return Err(RegistryError::DuplicateFeed {
                        name: descriptor.name.clone(),
                    });
                }
                Entry::Vacant(slot) => {
                    let engine = FeedCacheEngine::new(
                        &descriptor.name,
                        factory.build(descriptor),
                        deps.clone(),
                        config.engine,
                    );
                    slot.insert(Arc::new(engine));
                }
            }
            info!(
                target = "rss_translator::application::registry",
                feed = %descriptor.name,
                url = %descriptor.url,
                "feed initialized"
            );
        }

        Ok(Self {
            cache: deps.cache,
            descriptors: catalog.feeds,
            engines,
        })
    }

    /// Configured feeds in catalog order.
    pub fn descriptors(&self) -> &[FeedDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engine(&self, name: &str) -> Result<&Arc<FeedCacheEngine>, RegistryError> {
        self.engines
            .get(&name.to_lowercase())
            .ok_or_else(|| RegistryError::FeedNotFound(name.to_string()))
    }

    /// Current content for the named feed; lookup is case-insensitive.
    pub async fn resolve(&self, name: &str) -> Result<CachedResult, RegistryError> {
        let engine = self.engine(name)?;
        engine
            .resolve()
            .await
            .map_err(|source| RegistryError::Engine {
                feed: engine.name().to_string(),
                source,
            })
    }

    /// Resolve every feed concurrently and wait for all of them, including
    /// any background refresh a stale read scheduled.
    pub async fn refresh_all(&self) -> Vec<FeedRefreshOutcome> {
        let refreshes = self.descriptors.iter().map(|descriptor| async move {
            let feed = descriptor.name.clone();
            let engine = match self.engine(&descriptor.name) {
                Ok(engine) => engine,
                Err(err) => {
                    return FeedRefreshOutcome {
                        feed,
                        ok: false,
                        cache: None,
                        refresh: None,
                        error: Some(err.to_string()),
                    };
                }
            };

            match engine.resolve().await {
                Ok(result) => {
                    let cache = Some(result.status.as_str());
                    if result.refresh_skipped {
                        return FeedRefreshOutcome {
                            feed,
                            ok: true,
                            cache,
                            refresh: Some("skipped"),
                            error: None,
                        };
                    }
                    let Some(handle) = result.background_refresh else {
                        return FeedRefreshOutcome {
                            feed,
                            ok: true,
                            cache,
                            refresh: None,
                            error: None,
                        };
                    };
                    match handle.join().await {
                        RefreshOutcome::Refreshed => FeedRefreshOutcome {
                            feed,
                            ok: true,
                            cache,
                            refresh: Some("completed"),
                            error: None,
                        },
                        RefreshOutcome::Failed(reason) => FeedRefreshOutcome {
                            feed,
                            ok: false,
                            cache,
                            refresh: Some("failed"),
                            error: Some(reason),
                        },
                    }
                }
                Err(err) => FeedRefreshOutcome {
                    feed,
                    ok: false,
                    cache: None,
                    refresh: None,
                    error: Some(err.to_string()),
                },
            }
        });

        let outcomes = join_all(refreshes).await;
        let failed = outcomes.iter().filter(|outcome| !outcome.ok).count();
        if failed > 0 {
            warn!(
                target = "rss_translator::application::registry",
                failed,
                total = outcomes.len(),
                "feed refresh finished with failures"
            );
        } else {
            info!(
                target = "rss_translator::application::registry",
                total = outcomes.len(),
                "all feeds refreshed"
            );
        }
        outcomes
    }

    /// Evict the cached catalog. Engines already built are left as they are.
    pub async fn clear_config_cache(&self) -> Result<(), RegistryError> {
        self.cache.delete(FEEDS_CONFIG_KEY).await?;
        info!(
            target = "rss_translator::application::registry",
            cache_key = FEEDS_CONFIG_KEY,
            "feed configuration cache cleared"
        );
        Ok(())
    }
}

async fn load_catalog(
    cache: &KeyValueCache,
    source: &dyn FeedCatalogSource,
    ttl: Duration,
) -> Result<FeedCatalog, RegistryError> {
    if let Some(catalog) = cache.get::<FeedCatalog>(FEEDS_CONFIG_KEY).await? {
        match catalog.validate() {
            Ok(()) => {
                info!(
                    target = "rss_translator::application::registry",
                    feeds = catalog.feeds.len(),
                    "using cached feed configuration"
                );
                return Ok(catalog);
            }
            Err(err) => warn!(
                target = "rss_translator::application::registry",
                error = %err,
                "ignoring invalid cached feed configuration"
            ),
        }
    }

    let catalog = source.load().await?;
    info!(
        target = "rss_translator::application::registry",
        feeds = catalog.feeds.len(),
        "loaded feed configuration from catalog"
    );
    if let Err(err) = cache
        .put(FEEDS_CONFIG_KEY, &catalog, PutOptions::with_ttl(ttl))
        .await
    {
        warn!(
            target = "rss_translator::application::registry",
            error = %err,
            "failed to cache feed configuration"
        );
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog::StaticCatalogSource;
    use crate::cache::{
        CacheStatus, FreshnessWindow, InFlightRefreshes, ManualClock, MemoryKvStore,
    };
    use crate::feed::testing::{ScriptedFactory, ScriptedSource};

    struct Fixture {
        deps: EngineDeps,
        clock: Arc<ManualClock>,
        source: Arc<ScriptedSource>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = KeyValueCache::new(Arc::new(MemoryKvStore::with_capacity(64, clock.clone())));
        Fixture {
            deps: EngineDeps {
                cache,
                clock: clock.clone(),
                refreshes: InFlightRefreshes::new(),
            },
            clock,
            source: ScriptedSource::ok("<rss>v1</rss>"),
        }
    }

    fn config() -> RegistryConfig {
        RegistryConfig {
            engine: EngineConfig {
                window: FreshnessWindow::new(Duration::from_secs(7200), Duration::from_secs(7260))
                    .expect("window"),
                generation_timeout: Duration::from_secs(5),
            },
            config_ttl: Duration::from_secs(86_400),
        }
    }

    fn catalog(names: &[&str]) -> StaticCatalogSource {
        StaticCatalogSource::new(FeedCatalog {
            feeds: names
                .iter()
                .map(|name| {
                    FeedDescriptor::new(*name, &format!("https://example.com/{name}.xml"))
                        .expect("descriptor")
                })
                .collect(),
        })
    }

    async fn registry(fx: &Fixture, names: &[&str]) -> Result<FeedRegistry, RegistryError> {
        FeedRegistry::initialize(
            fx.deps.clone(),
            &catalog(names),
            &ScriptedFactory {
                source: fx.source.clone(),
            },
            config(),
        )
        .await
    }

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let fx = fixture();
        let registry = registry(&fx, &["HN", "lobsters"]).await.expect("registry");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.engine("hn").expect("hn").key(), "feed:hn");
        assert!(registry.engine("LOBSTERS").is_ok());
        assert!(matches!(
            registry.resolve("slashdot").await,
            Err(RegistryError::FeedNotFound(name)) if name == "slashdot"
        ));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let fx = fixture();
        let err = registry(&fx, &["hn", "HN"]).await.err().expect("duplicate");
        assert!(matches!(err, RegistryError::DuplicateFeed { name } if name == "HN"));
    }

    #[tokio::test]
    async fn catalog_is_cached_and_reused() {
        let fx = fixture();
        registry(&fx, &["hn"]).await.expect("first");

        let cached: Option<FeedCatalog> = fx.deps.cache.get(FEEDS_CONFIG_KEY).await.expect("read");
        assert_eq!(cached.expect("cached").feeds.len(), 1);

        // A different catalog source is ignored while the cached copy lives.
        let second = registry(&fx, &["lobsters"]).await.expect("second");
        assert_eq!(second.descriptors()[0].name, "hn");

        fx.clock.advance_secs(86_400);
        let third = registry(&fx, &["lobsters"]).await.expect("third");
        assert_eq!(third.descriptors()[0].name, "lobsters");
    }

    #[tokio::test]
    async fn clear_config_cache_evicts_only_catalog() {
        let fx = fixture();
        let registry = registry(&fx, &["hn"]).await.expect("registry");
        registry.resolve("hn").await.expect("resolve");

        registry.clear_config_cache().await.expect("clear");

        assert!(fx.deps.cache.get_text(FEEDS_CONFIG_KEY).await.expect("read").is_none());
        assert!(fx.deps.cache.get_text("feed:hn").await.expect("read").is_some());
        assert!(registry.engine("hn").is_ok());
    }

    #[tokio::test]
    async fn refresh_all_reports_every_feed() {
        let fx = fixture();
        let registry = registry(&fx, &["hn", "lobsters"]).await.expect("registry");

        let outcomes = registry.refresh_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| outcome.ok));
        assert!(outcomes.iter().all(|outcome| outcome.cache == Some("MISS")));
        assert_eq!(outcomes[0].feed, "hn");
        assert_eq!(outcomes[1].feed, "lobsters");

        let result = registry.resolve("hn").await.expect("hit");
        assert_eq!(result.status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn refresh_all_collects_failures_without_failing_fast() {
        let fx = fixture();
        let registry = registry(&fx, &["hn", "lobsters"]).await.expect("registry");
        fx.source.fail_with("upstream down");

        let outcomes = registry.refresh_all().await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|outcome| !outcome.ok));
        assert!(
            outcomes
                .iter()
                .all(|outcome| outcome.error.as_deref().is_some_and(|e| e.contains("upstream down")))
        );
    }

    #[tokio::test]
    async fn refresh_all_waits_for_stale_refreshes() {
        let fx = fixture();
        let registry = registry(&fx, &["hn"]).await.expect("registry");
        registry.refresh_all().await;
        fx.source.set_body("<rss>v2</rss>");
        fx.clock.advance_secs(7230);

        let outcomes = registry.refresh_all().await;
        assert_eq!(outcomes[0].cache, Some("HIT"));
        assert_eq!(outcomes[0].refresh, Some("completed"));
        assert!(outcomes[0].ok);

        let result = registry.resolve("hn").await.expect("fresh");
        assert_eq!(result.content, "<rss>v2</rss>");
    }

    #[tokio::test]
    async fn refresh_all_marks_feeds_already_refreshing_as_skipped() {
        let fx = Fixture {
            source: ScriptedSource::slow("<rss>v1</rss>", Duration::from_millis(200)),
            ..fixture()
        };
        let registry = registry(&fx, &["hn"]).await.expect("registry");
        registry.refresh_all().await;
        fx.clock.advance_secs(7230);

        let pending = registry
            .resolve("hn")
            .await
            .expect("stale")
            .background_refresh
            .expect("refresh started");

        let outcomes = registry.refresh_all().await;
        assert_eq!(outcomes[0].cache, Some("HIT"));
        assert_eq!(outcomes[0].refresh, Some("skipped"));
        assert!(outcomes[0].ok);

        assert!(matches!(pending.join().await, RefreshOutcome::Refreshed));
        assert_eq!(fx.source.calls(), 2);
    }
}
