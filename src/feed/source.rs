use async_trait::async_trait;
use reqwest::{Client, Url, header};
use tracing::debug;

use super::GenerateError;
use crate::config::FetchSettings;

/// Produces the raw document a feed is generated from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<String, GenerateError>;
}

/// Fetches a remote feed over HTTP.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: Client,
    url: Url,
}

impl HttpFeedSource {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<String, GenerateError> {
        debug!(
            target = "rss_translator::feed::source",
            url = %self.url,
            "fetching feed source"
        );

        let response = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "application/xml")
            .send()
            .await
            .map_err(|err| {
                let reason = if err.is_timeout() {
                    "request timed out".to_string()
                } else {
                    err.to_string()
                };
                GenerateError::source_unavailable(self.url.as_str(), reason)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerateError::source_unavailable(
                self.url.as_str(),
                format!("status {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|err| GenerateError::source_unavailable(self.url.as_str(), err.to_string()))?;
        debug!(
            target = "rss_translator::feed::source",
            url = %self.url,
            bytes = body.len(),
            "feed source fetched"
        );
        Ok(body)
    }
}

/// Shared client for feed fetches.
pub fn build_http_client(settings: &FetchSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.timeout)
        .build()
}
