use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{GenerateError, RssDocument};
use crate::translate::Translator;

/// Rewrites fetched content before it is cached.
#[async_trait]
pub trait FeedTransform: Send + Sync {
    async fn transform(&self, raw: String) -> Result<String, GenerateError>;
}

/// Translates item titles and splices them back into the document.
#[derive(Clone)]
pub struct TitleTranslation {
    translator: Arc<dyn Translator>,
}

impl TitleTranslation {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self { translator }
    }
}

#[async_trait]
impl FeedTransform for TitleTranslation {
    async fn transform(&self, raw: String) -> Result<String, GenerateError> {
        let document = RssDocument::parse(raw)?;
        let titles = document.titles();
        debug!(
            target = "rss_translator::feed::transform",
            titles = titles.len(),
            "extracted item titles"
        );

        let translations = self.translator.translate(&titles).await?;
        if translations.len() < titles.len() {
            warn!(
                target = "rss_translator::feed::transform",
                expected = titles.len(),
                received = translations.len(),
                "partial translation, remaining titles keep original text"
            );
        } else if translations.len() > titles.len() {
            debug!(
                target = "rss_translator::feed::transform",
                expected = titles.len(),
                received = translations.len(),
                "ignoring surplus translations"
            );
        }

        Ok(document.into_translated(&translations))
    }
}
