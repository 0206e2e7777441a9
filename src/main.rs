use std::{process, sync::Arc};

use reqwest::Client;
use rss_translator::{
    application::{
        catalog::FileCatalogSource,
        error::AppError,
        registry::{FeedRefreshOutcome, FeedRegistry, RegistryConfig},
    },
    cache::{
        EngineConfig, EngineDeps, InFlightRefreshes, KeyValueCache, MemoryKvStore, SystemClock,
    },
    config,
    feed::{HttpGeneratorFactory, build_http_client},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
    translate::{ProviderTranslator, Translator},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Refresh(_) => run_refresh(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;

    let router = http::build_router(app.http_state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "rss_translator::serve",
        addr = %settings.server.addr,
        feeds = app.registry.len(),
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn run_refresh(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;

    info!(
        target = "rss_translator::refresh",
        feeds = app.registry.len(),
        "Starting refresh"
    );

    let outcomes = app.registry.refresh_all().await;
    print_outcomes(&outcomes)?;

    let failed: Vec<_> = outcomes
        .iter()
        .filter(|outcome| !outcome.ok)
        .map(|outcome| outcome.feed.as_str())
        .collect();
    if failed.is_empty() {
        info!(target = "rss_translator::refresh", "Refresh completed");
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "refresh failed for: {}",
            failed.join(", ")
        )))
    }
}

fn print_outcomes(outcomes: &[FeedRefreshOutcome]) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(outcomes)
        .map_err(|err| AppError::unexpected(format!("failed to render outcomes: {err}")))?;
    println!("{rendered}");
    Ok(())
}

struct ApplicationContext {
    http_state: HttpState,
    registry: Arc<FeedRegistry>,
}

async fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let clock = Arc::new(SystemClock);
    let store = Arc::new(MemoryKvStore::new(settings.store.capacity, clock.clone()));
    let deps = EngineDeps {
        cache: KeyValueCache::new(store),
        clock,
        refreshes: InFlightRefreshes::new(),
    };

    let fetch_client = build_http_client(&settings.fetch).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "failed to build feed http client: {err}"
        )))
    })?;

    let translator = if settings.translation.enabled {
        let client = Client::builder()
            .user_agent(settings.fetch.user_agent.clone())
            .build()
            .map_err(|err| {
                AppError::from(InfraError::configuration(format!(
                    "failed to build translation http client: {err}"
                )))
            })?;
        let translator: Arc<dyn Translator> = Arc::new(ProviderTranslator::from_settings(
            client,
            &settings.translation,
        ));
        Some(translator)
    } else {
        info!(
            target = "rss_translator::context",
            "translation disabled; feeds are served untranslated"
        );
        None
    };

    let factory = HttpGeneratorFactory::new(fetch_client, translator);
    let catalog = FileCatalogSource::new(settings.feeds.catalog_path.clone());
    let config = RegistryConfig {
        engine: EngineConfig {
            window: settings.cache.window,
            generation_timeout: settings.cache.generation_timeout,
        },
        config_ttl: settings.cache.config_ttl,
    };

    let registry = Arc::new(FeedRegistry::initialize(deps, &catalog, &factory, config).await?);

    Ok(ApplicationContext {
        http_state: HttpState {
            registry: registry.clone(),
        },
        registry,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "rss_translator::serve",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "rss_translator::serve", "shutdown requested");
}
