use std::sync::Arc;

use reqwest::Client;

use super::{FeedSource, FeedTransform, GenerateError, HttpFeedSource, TitleTranslation};
use crate::domain::feeds::FeedDescriptor;
use crate::translate::Translator;

/// Source plus optional transform, fixed when an engine is built.
#[derive(Clone)]
pub struct ContentGenerator {
    source: Arc<dyn FeedSource>,
    transform: Option<Arc<dyn FeedTransform>>,
}

impl ContentGenerator {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        Self {
            source,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn FeedTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Fetch the source and run it through the transform, if any.
    pub async fn generate(&self) -> Result<String, GenerateError> {
        let raw = self.source.fetch().await?;
        match &self.transform {
            Some(transform) => transform.transform(raw).await,
            None => Ok(raw),
        }
    }
}

/// Chooses the generation strategy for each configured feed.
pub trait GeneratorFactory: Send + Sync {
    fn build(&self, descriptor: &FeedDescriptor) -> ContentGenerator;
}

/// Fetches feeds over HTTP and translates titles when a translator is set.
#[derive(Clone)]
pub struct HttpGeneratorFactory {
    client: Client,
    translator: Option<Arc<dyn Translator>>,
}

impl HttpGeneratorFactory {
    pub fn new(client: Client, translator: Option<Arc<dyn Translator>>) -> Self {
        Self { client, translator }
    }
}

impl GeneratorFactory for HttpGeneratorFactory {
    fn build(&self, descriptor: &FeedDescriptor) -> ContentGenerator {
        let source = HttpFeedSource::new(self.client.clone(), descriptor.url.clone());
        let generator = ContentGenerator::new(Arc::new(source));
        match &self.translator {
            Some(translator) => {
                generator.with_transform(Arc::new(TitleTranslation::new(Arc::clone(translator))))
            }
            None => generator,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct StaticSource(Result<&'static str, &'static str>);

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch(&self) -> Result<String, GenerateError> {
            self.0
                .map(str::to_string)
                .map_err(|reason| GenerateError::source_unavailable("test://feed", reason))
        }
    }

    struct Uppercase;

    #[async_trait]
    impl FeedTransform for Uppercase {
        async fn transform(&self, raw: String) -> Result<String, GenerateError> {
            Ok(raw.to_uppercase())
        }
    }

    #[tokio::test]
    async fn source_only_returns_raw_content() {
        let generator = ContentGenerator::new(Arc::new(StaticSource(Ok("<rss/>"))));
        assert!(!generator.has_transform());
        assert_eq!(generator.generate().await.expect("generate"), "<rss/>");
    }

    #[tokio::test]
    async fn transform_is_applied_to_source_output() {
        let generator = ContentGenerator::new(Arc::new(StaticSource(Ok("<rss/>"))))
            .with_transform(Arc::new(Uppercase));
        assert_eq!(generator.generate().await.expect("generate"), "<RSS/>");
    }

    #[tokio::test]
    async fn source_failure_skips_transform() {
        let generator = ContentGenerator::new(Arc::new(StaticSource(Err("503"))))
            .with_transform(Arc::new(Uppercase));
        let err = generator.generate().await.expect_err("fails");
        assert_eq!(err.kind(), "source_unavailable");
    }

    #[test]
    fn factory_adds_translation_only_with_translator() {
        let descriptor = FeedDescriptor::new("hn", "https://news.ycombinator.com/rss")
            .expect("descriptor");

        let plain = HttpGeneratorFactory::new(Client::new(), None);
        assert!(!plain.build(&descriptor).has_transform());

        struct Echo;
        #[async_trait]
        impl Translator for Echo {
            async fn translate(
                &self,
                titles: &[String],
            ) -> Result<Vec<String>, crate::translate::TranslationError> {
                Ok(titles.to_vec())
            }
        }
        let translating = HttpGeneratorFactory::new(Client::new(), Some(Arc::new(Echo)));
        assert!(translating.build(&descriptor).has_transform());
    }
}
