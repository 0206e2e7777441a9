//! Title translation backends.

pub mod provider;
pub mod response;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;

pub use provider::ProviderTranslator;
pub use response::parse_translations;

/// Translates an ordered list of strings.
///
/// The result is aligned by position with the input and may be shorter than
/// it when the backend drops entries.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, titles: &[String]) -> Result<Vec<String>, TranslationError>;
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation provider, model or api key not configured")]
    MissingCredentials,
    #[error("translation provider `{0}` is not supported")]
    UnsupportedProvider(String),
    #[error("translation backend failed: {0}")]
    Backend(String),
    #[error("translation response could not be parsed: {0}")]
    MalformedResponse(String),
}

impl TranslationError {
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    pub fn malformed(err: impl fmt::Display) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Mistral,
    OpenRouter,
    Cohere,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Mistral => "mistral",
            Provider::OpenRouter => "openrouter",
            Provider::Cohere => "cohere",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Provider::Mistral => "https://api.mistral.ai/v1/chat/completions",
            Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Provider::Cohere => "https://api.cohere.com/v2/chat",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = TranslationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mistral" => Ok(Provider::Mistral),
            "openrouter" => Ok(Provider::OpenRouter),
            "cohere" => Ok(Provider::Cohere),
            _ => Err(TranslationError::UnsupportedProvider(value.to_string())),
        }
    }
}
