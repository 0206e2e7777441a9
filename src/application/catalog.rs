use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::error::DomainError;
use crate::domain::feeds::FeedCatalog;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read feed catalog `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse feed catalog `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

/// Where the feed catalog comes from when it is not cached.
#[async_trait]
pub trait FeedCatalogSource: Send + Sync {
    async fn load(&self) -> Result<FeedCatalog, CatalogError>;
}

/// Reads `{"feeds": [...]}` from a JSON file.
#[derive(Debug, Clone)]
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedCatalogSource for FileCatalogSource {
    async fn load(&self) -> Result<FeedCatalog, CatalogError> {
        debug!(
            target = "rss_translator::application::catalog",
            path = %self.path.display(),
            "loading feed catalog"
        );
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| CatalogError::Read {
                path: self.path.clone(),
                source,
            })?;
        let catalog: FeedCatalog =
            serde_json::from_slice(&raw).map_err(|source| CatalogError::Parse {
                path: self.path.clone(),
                source,
            })?;
        catalog.validate()?;
        Ok(catalog)
    }
}

/// A catalog fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogSource {
    catalog: FeedCatalog,
}

impl StaticCatalogSource {
    pub fn new(catalog: FeedCatalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl FeedCatalogSource for StaticCatalogSource {
    async fn load(&self) -> Result<FeedCatalog, CatalogError> {
        self.catalog.validate()?;
        Ok(self.catalog.clone())
    }
}
