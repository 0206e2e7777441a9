#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use rss_translator::{
    application::{
        catalog::StaticCatalogSource,
        registry::{FeedRegistry, RegistryConfig},
    },
    cache::{
        EngineConfig, EngineDeps, FreshnessWindow, InFlightRefreshes, KeyValueCache, ManualClock,
        MemoryKvStore,
    },
    domain::feeds::{FeedCatalog, FeedDescriptor},
    feed::{ContentGenerator, FeedSource, GenerateError, GeneratorFactory, TitleTranslation},
    translate::{TranslationError, Translator},
};

pub const T0: i64 = 1_700_000_000_000;
pub const FRESH_TTL: u64 = 7200;
pub const HARD_TTL: u64 = 7260;

pub fn rss(titles: &[&str]) -> String {
    let items: String = titles
        .iter()
        .map(|title| format!("<item><title>{title}</title><link>https://example.com/</link></item>"))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Example</title>{items}</channel></rss>"#
    )
}

/// Upstream stand-in with a swappable body.
pub struct FakeSource {
    body: Mutex<Result<String, String>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            body: Mutex::new(Ok(body.into())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_body(&self, body: impl Into<String>) {
        *self.body.lock().expect("lock") = Ok(body.into());
    }

    pub fn fail_with(&self, reason: &str) {
        *self.body.lock().expect("lock") = Err(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeSource {
    async fn fetch(&self) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self.body.lock().expect("lock").clone();
        body.map_err(|reason| GenerateError::source_unavailable("https://example/hn.xml", reason))
    }
}

/// Prefixes every title with `[zh] `.
#[derive(Default)]
pub struct PrefixTranslator {
    calls: AtomicUsize,
}

impl PrefixTranslator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for PrefixTranslator {
    async fn translate(&self, titles: &[String]) -> Result<Vec<String>, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(titles.iter().map(|title| format!("[zh] {title}")).collect())
    }
}

/// Serves every feed from the source registered under its name.
#[derive(Default)]
pub struct FakeFactory {
    sources: HashMap<String, Arc<FakeSource>>,
    translator: Option<Arc<PrefixTranslator>>,
}

impl FakeFactory {
    pub fn with_source(mut self, name: &str, source: Arc<FakeSource>) -> Self {
        self.sources.insert(name.to_string(), source);
        self
    }

    pub fn with_translator(mut self, translator: Arc<PrefixTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }
}

impl GeneratorFactory for FakeFactory {
    fn build(&self, descriptor: &FeedDescriptor) -> ContentGenerator {
        let source = self
            .sources
            .get(&descriptor.name)
            .cloned()
            .unwrap_or_else(|| FakeSource::new(rss(&["placeholder"])));
        let generator = ContentGenerator::new(source);
        match &self.translator {
            Some(translator) => {
                let translator: Arc<dyn Translator> = translator.clone();
                generator.with_transform(Arc::new(TitleTranslation::new(translator)))
            }
            None => generator,
        }
    }
}

pub struct Harness {
    pub registry: FeedRegistry,
    pub clock: Arc<ManualClock>,
    pub cache: KeyValueCache,
}

pub fn registry_config() -> RegistryConfig {
    RegistryConfig {
        engine: EngineConfig {
            window: FreshnessWindow::new(
                Duration::from_secs(FRESH_TTL),
                Duration::from_secs(HARD_TTL),
            )
            .expect("window"),
            generation_timeout: Duration::from_secs(5),
        },
        config_ttl: Duration::from_secs(86_400),
    }
}

pub async fn harness(feeds: &[(&str, &str)], factory: FakeFactory) -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let cache = KeyValueCache::new(Arc::new(MemoryKvStore::with_capacity(64, clock.clone())));
    let catalog = FeedCatalog {
        feeds: feeds
            .iter()
            .map(|(name, url)| FeedDescriptor::new(*name, url).expect("descriptor"))
            .collect(),
    };
    let registry = FeedRegistry::initialize(
        EngineDeps {
            cache: cache.clone(),
            clock: clock.clone(),
            refreshes: InFlightRefreshes::new(),
        },
        &StaticCatalogSource::new(catalog),
        &factory,
        registry_config(),
    )
    .await
    .expect("registry");

    Harness {
        registry,
        clock,
        cache,
    }
}
