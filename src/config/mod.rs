//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::FreshnessWindow;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "rss-translator";
const ENV_PREFIX: &str = "RSS_TRANSLATOR";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CATALOG_PATH: &str = "config/feeds.json";
const DEFAULT_FRESH_TTL_SECS: u64 = 7200;
const DEFAULT_HARD_TTL_SECS: u64 = 7260;
const DEFAULT_CONFIG_TTL_SECS: u64 = 86_400;
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_STORE_CAPACITY: u64 = 1024;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRANSLATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TARGET_LANGUAGE: &str = "Chinese";

/// Command-line arguments for the rss-translator binary.
#[derive(Debug, Parser)]
#[command(
    name = "rss-translator",
    version,
    about = "Caching proxy that serves RSS feeds with translated titles"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "RSS_TRANSLATOR_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Resolve every configured feed once and report the outcome.
    Refresh(RefreshArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub overrides: FeedOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub feeds: FeedOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,
}

/// Overrides shared by every command that builds feed engines.
#[derive(Debug, Args, Default, Clone)]
pub struct FeedOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the feed catalog file.
    #[arg(long = "feeds-catalog", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub feeds_catalog: Option<PathBuf>,

    /// Override how long generated content is served without a refresh.
    #[arg(long = "cache-fresh-ttl-seconds", value_name = "SECONDS")]
    pub cache_fresh_ttl_seconds: Option<u64>,

    /// Override how long generated content is kept at all.
    #[arg(long = "cache-hard-ttl-seconds", value_name = "SECONDS")]
    pub cache_hard_ttl_seconds: Option<u64>,

    /// Toggle title translation.
    #[arg(
        long = "translation-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub translation_enabled: Option<bool>,

    /// Override the translation provider (mistral|openrouter|cohere).
    #[arg(long = "translation-provider", value_name = "PROVIDER")]
    pub translation_provider: Option<String>,

    /// Override the translation model.
    #[arg(long = "translation-model", value_name = "MODEL")]
    pub translation_model: Option<String>,

    /// Override the language titles are translated into.
    #[arg(long = "translation-target-language", value_name = "LANGUAGE")]
    pub translation_target_language: Option<String>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub feeds: FeedSettings,
    pub cache: CacheSettings,
    pub store: StoreSettings,
    pub fetch: FetchSettings,
    pub translation: TranslationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub catalog_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub window: FreshnessWindow,
    pub config_ttl: Duration,
    pub generation_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

/// Translation backend selection.
///
/// Provider, model and key stay optional here; a missing value is reported
/// when a feed is first translated.
#[derive(Debug, Clone)]
pub struct TranslationSettings {
    pub enabled: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub target_language: String,
    pub timeout: Duration,
    pub base_url: Option<Url>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Refresh(args)) => raw.apply_feed_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    feeds: RawFeedSettings,
    cache: RawCacheSettings,
    store: RawStoreSettings,
    fetch: RawFetchSettings,
    translation: RawTranslationSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }

        self.apply_feed_overrides(&overrides.feeds);
    }

    fn apply_feed_overrides(&mut self, overrides: &FeedOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(path) = overrides.feeds_catalog.as_ref() {
            self.feeds.catalog_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.cache_fresh_ttl_seconds {
            self.cache.fresh_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_hard_ttl_seconds {
            self.cache.hard_ttl_seconds = Some(seconds);
        }
        if let Some(enabled) = overrides.translation_enabled {
            self.translation.enabled = Some(enabled);
        }
        if let Some(provider) = overrides.translation_provider.as_ref() {
            self.translation.provider = Some(provider.clone());
        }
        if let Some(model) = overrides.translation_model.as_ref() {
            self.translation.model = Some(model.clone());
        }
        if let Some(language) = overrides.translation_target_language.as_ref() {
            self.translation.target_language = Some(language.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            feeds,
            cache,
            store,
            fetch,
            translation,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let feeds = build_feed_settings(feeds)?;
        let cache = build_cache_settings(cache)?;
        let store = build_store_settings(store)?;
        let fetch = build_fetch_settings(fetch)?;
        let translation = build_translation_settings(translation)?;

        Ok(Self {
            server,
            logging,
            feeds,
            cache,
            store,
            fetch,
            translation,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;
    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_feed_settings(feeds: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let catalog_path = feeds
        .catalog_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH));
    if catalog_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "feeds.catalog_path",
            "path must not be empty",
        ));
    }
    Ok(FeedSettings { catalog_path })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let fresh = positive_seconds(
        cache.fresh_ttl_seconds.unwrap_or(DEFAULT_FRESH_TTL_SECS),
        "cache.fresh_ttl_seconds",
    )?;
    let hard = positive_seconds(
        cache.hard_ttl_seconds.unwrap_or(DEFAULT_HARD_TTL_SECS),
        "cache.hard_ttl_seconds",
    )?;
    let window = FreshnessWindow::new(fresh, hard)
        .map_err(|err| LoadError::invalid("cache.hard_ttl_seconds", err.to_string()))?;

    let config_ttl = positive_seconds(
        cache.config_ttl_seconds.unwrap_or(DEFAULT_CONFIG_TTL_SECS),
        "cache.config_ttl_seconds",
    )?;
    let generation_timeout = positive_seconds(
        cache
            .generation_timeout_seconds
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS),
        "cache.generation_timeout_seconds",
    )?;

    Ok(CacheSettings {
        window,
        config_ttl,
        generation_timeout,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let capacity = non_zero_u32(
        store.capacity.unwrap_or(DEFAULT_STORE_CAPACITY),
        "store.capacity",
    )?;
    let capacity = usize::try_from(capacity.get())
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("store.capacity", "value exceeds supported range for usize")
        })?;
    Ok(StoreSettings { capacity })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let timeout = positive_seconds(
        fetch.timeout_seconds.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        "fetch.timeout_seconds",
    )?;
    let user_agent = non_blank(fetch.user_agent)
        .unwrap_or_else(|| concat!("rss-translator/", env!("CARGO_PKG_VERSION")).to_string());
    Ok(FetchSettings {
        timeout,
        user_agent,
    })
}

fn build_translation_settings(
    translation: RawTranslationSettings,
) -> Result<TranslationSettings, LoadError> {
    let timeout = positive_seconds(
        translation
            .timeout_seconds
            .unwrap_or(DEFAULT_TRANSLATION_TIMEOUT_SECS),
        "translation.timeout_seconds",
    )?;
    let target_language = non_blank(translation.target_language)
        .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string());
    let base_url = non_blank(translation.base_url)
        .map(|value| {
            Url::parse(&value).map_err(|err| {
                LoadError::invalid("translation.base_url", format!("invalid url `{value}`: {err}"))
            })
        })
        .transpose()?;

    Ok(TranslationSettings {
        enabled: translation.enabled.unwrap_or(true),
        provider: non_blank(translation.provider),
        model: non_blank(translation.model),
        api_key: non_blank(translation.api_key),
        target_language,
        timeout,
        base_url,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    fresh_ttl_seconds: Option<u64>,
    hard_ttl_seconds: Option<u64>,
    config_ttl_seconds: Option<u64>,
    generation_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTranslationSettings {
    enabled: Option<bool>,
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    target_language: Option<String>,
    timeout_seconds: Option<u64>,
    base_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
