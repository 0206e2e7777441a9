//! Chat-completion translation providers.
//!
//! Mistral and OpenRouter speak the OpenAI-compatible completions API; Cohere
//! uses its v2 chat API. The reply is parsed by [`parse_translations`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url, header};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Provider, TranslationError, Translator, parse_translations};
use crate::config::TranslationSettings;

const ERROR_BODY_PREVIEW: usize = 512;

/// Translator backed by a hosted LLM provider.
///
/// Credentials are checked per call so a misconfigured provider surfaces as a
/// generation failure for the affected request instead of a startup error.
#[derive(Clone)]
pub struct ProviderTranslator {
    client: Client,
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    target_language: String,
    timeout: Duration,
    endpoint_override: Option<Url>,
}

struct Credentials<'a> {
    provider: Provider,
    model: &'a str,
    api_key: &'a str,
}

impl ProviderTranslator {
    pub fn from_settings(client: Client, settings: &TranslationSettings) -> Self {
        Self {
            client,
            provider: settings.provider.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
            target_language: settings.target_language.clone(),
            timeout: settings.timeout,
            endpoint_override: settings.base_url.clone(),
        }
    }

    fn credentials(&self) -> Result<Credentials<'_>, TranslationError> {
        let (Some(provider), Some(model), Some(api_key)) = (
            present(&self.provider),
            present(&self.model),
            present(&self.api_key),
        ) else {
            return Err(TranslationError::MissingCredentials);
        };

        Ok(Credentials {
            provider: provider.parse()?,
            model,
            api_key,
        })
    }

    fn endpoint(&self, provider: Provider) -> String {
        self.endpoint_override
            .as_ref()
            .map(Url::to_string)
            .unwrap_or_else(|| provider.endpoint().to_string())
    }

    fn prompt(&self, titles: &[String]) -> Result<String, TranslationError> {
        let encoded = serde_json::to_string(titles).map_err(TranslationError::backend)?;
        Ok(format!(
            "Translate the following titles to {language}. Respond only with a JSON object \
             of the form {{\"data\": [\"...\"]}} holding one translated string per title, \
             in the same order: {encoded}",
            language = self.target_language
        ))
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl Translator for ProviderTranslator {
    async fn translate(&self, titles: &[String]) -> Result<Vec<String>, TranslationError> {
        let credentials = self.credentials()?;
        if titles.is_empty() {
            return Ok(Vec::new());
        }

        let payload = json!({
            "model": credentials.model,
            "messages": [
                { "role": "user", "content": self.prompt(titles)? }
            ],
        });

        debug!(
            target = "rss_translator::translate",
            provider = %credentials.provider,
            model = credentials.model,
            titles = titles.len(),
            "requesting translation"
        );

        let response = self
            .client
            .post(self.endpoint(credentials.provider))
            .bearer_auth(credentials.api_key)
            .header(header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TranslationError::Backend(format!(
                        "{} request timed out after {:?}",
                        credentials.provider, self.timeout
                    ))
                } else {
                    TranslationError::Backend(format!("{} request failed: {err}", credentials.provider))
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(TranslationError::backend)?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            warn!(
                target = "rss_translator::translate",
                provider = %credentials.provider,
                status = status.as_u16(),
                "translation provider rejected request"
            );
            return Err(TranslationError::Backend(format!(
                "{} returned status {status}: {preview}",
                credentials.provider
            )));
        }

        let reply = reply_text(credentials.provider, &body)?;
        let translations = parse_translations(&reply)?;
        debug!(
            target = "rss_translator::translate",
            provider = %credentials.provider,
            requested = titles.len(),
            received = translations.len(),
            "translation received"
        );
        Ok(translations)
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<Value>,
}

#[derive(Deserialize)]
struct CohereChat {
    message: CohereMessage,
}

#[derive(Deserialize)]
struct CohereMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Deserialize)]
struct CohereContent {
    #[serde(default)]
    text: Option<String>,
}

fn reply_text(provider: Provider, body: &str) -> Result<String, TranslationError> {
    match provider {
        Provider::Mistral | Provider::OpenRouter => {
            let completion: ChatCompletion =
                serde_json::from_str(body).map_err(TranslationError::malformed)?;
            let content = completion
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .ok_or_else(|| TranslationError::malformed("completion has no message content"))?;
            // Some providers return structured content instead of a string.
            Ok(match content {
                Value::String(text) => text,
                other => other.to_string(),
            })
        }
        Provider::Cohere => {
            let chat: CohereChat = serde_json::from_str(body).map_err(TranslationError::malformed)?;
            chat.message
                .content
                .into_iter()
                .find_map(|part| part.text)
                .ok_or_else(|| TranslationError::malformed("chat reply has no text content"))
        }
    }
}
