use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use tracing::warn;

use crate::{
    application::{error::HttpError, registry::FeedRegistry},
    cache::CachedResult,
    presentation::views::{IndexTemplate, render_template_response},
};

use super::middleware::{log_responses, set_request_context};

const X_CACHE: &str = "x-cache";
const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<FeedRegistry>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feeds/refresh", post(refresh_feeds))
        .route("/feeds/{feed}", get(feed_content))
        .route("/api/clearcache", delete(clear_cache))
        .route("/_health", get(health))
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn index(State(state): State<HttpState>) -> Response {
    render_template_response(
        IndexTemplate::new(state.registry.descriptors()),
        StatusCode::OK,
    )
}

async fn feed_content(State(state): State<HttpState>, Path(feed): Path<String>) -> Response {
    match state.registry.resolve(&feed).await {
        Ok(result) => feed_response(result),
        Err(err) => HttpError::from(err).into_response(),
    }
}

fn feed_response(result: CachedResult) -> Response {
    let CachedResult {
        content,
        status,
        directive,
        background_refresh,
        ..
    } = result;
    // The refresh keeps running after the handle is dropped.
    drop(background_refresh);

    let mut response = (StatusCode::OK, content).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
    headers.insert(X_CACHE, HeaderValue::from_static(status.as_str()));
    match HeaderValue::from_str(&directive.to_string()) {
        Ok(value) => {
            headers.insert(CACHE_CONTROL, value);
        }
        Err(err) => warn!(
            target = "rss_translator::http::feed",
            error = %err,
            "cache directive is not a valid header value"
        ),
    }
    response
}

async fn refresh_feeds(State(state): State<HttpState>) -> Response {
    let outcomes = state.registry.refresh_all().await;
    let failed = outcomes.iter().filter(|outcome| !outcome.ok).count();
    if failed == 0 {
        return (StatusCode::OK, Json(outcomes)).into_response();
    }

    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(outcomes)).into_response();
    crate::application::error::ErrorReport::from_message(
        "infra::http::public::refresh_feeds",
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("{failed} feed(s) failed to refresh"),
    )
    .attach(&mut response);
    response
}

#[derive(Debug, Serialize)]
struct ClearCacheResponse {
    success: bool,
    message: &'static str,
}

async fn clear_cache(State(state): State<HttpState>) -> Response {
    match state.registry.clear_config_cache().await {
        Ok(()) => Json(ClearCacheResponse {
            success: true,
            message: "Cache cleared successfully",
        })
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
