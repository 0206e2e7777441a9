//! Feed catalog entries.

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::DomainError;

/// Path segment taken by the `/feeds/refresh` route.
pub const RESERVED_FEED_NAME: &str = "refresh";

/// A named remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedDescriptor {
    pub name: String,
    pub url: Url,
}

impl FeedDescriptor {
    pub fn new(name: impl Into<String>, url: &str) -> Result<Self, DomainError> {
        let url = Url::parse(url)
            .map_err(|err| DomainError::validation(format!("feed url `{url}`: {err}")))?;
        let descriptor = Self {
            name: name.into(),
            url,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Lookup key used by the registry and the cache.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("feed name must not be empty"));
        }
        if name.len() != self.name.len() || name.contains(['/', '?', '#']) {
            return Err(DomainError::validation(format!(
                "feed name `{}` must not contain surrounding whitespace, `/`, `?` or `#`",
                self.name
            )));
        }
        if name.eq_ignore_ascii_case(RESERVED_FEED_NAME) {
            return Err(DomainError::validation(format!(
                "feed name `{}` is reserved",
                self.name
            )));
        }
        if !matches!(self.url.scheme(), "http" | "https") {
            return Err(DomainError::validation(format!(
                "feed `{}` url must use http or https",
                self.name
            )));
        }
        Ok(())
    }
}

/// The catalog document: `{"feeds": [{"name": ..., "url": ...}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCatalog {
    pub feeds: Vec<FeedDescriptor>,
}

impl FeedCatalog {
    pub fn validate(&self) -> Result<(), DomainError> {
        self.feeds.iter().try_for_each(FeedDescriptor::validate)
    }
}
