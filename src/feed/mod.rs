//! Feed content generation: fetch a source document and optionally rewrite it.

pub mod document;
pub mod generator;
pub mod source;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use thiserror::Error;

use crate::translate::TranslationError;

pub use document::{RssDocument, StructureError};
pub use generator::{ContentGenerator, GeneratorFactory, HttpGeneratorFactory};
pub use source::{FeedSource, HttpFeedSource, build_http_client};
pub use transform::{FeedTransform, TitleTranslation};

/// Failure of one generation attempt. None of these ever produce a cache write.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("feed source `{url}` unavailable: {reason}")]
    SourceUnavailable { url: String, reason: String },
    #[error("title translation failed: {0}")]
    Translation(#[from] TranslationError),
    #[error("feed document rejected: {0}")]
    Structure(#[from] StructureError),
    #[error("content generation timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerateError {
    pub fn source_unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerateError::SourceUnavailable { .. } => "source_unavailable",
            GenerateError::Translation(_) => "translation",
            GenerateError::Structure(_) => "structure",
            GenerateError::Timeout(_) => "timeout",
        }
    }
}
