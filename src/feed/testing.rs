//! Scripted collaborators for unit tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{ContentGenerator, FeedSource, GenerateError, GeneratorFactory};
use crate::domain::feeds::FeedDescriptor;

/// A source whose reply can be swapped between calls.
pub struct ScriptedSource {
    reply: Mutex<Result<String, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn ok(body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(body.to_string())),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(body: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(body.to_string())),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_body(&self, body: &str) {
        *self.reply.lock().unwrap() = Ok(body.to_string());
    }

    pub fn fail_with(&self, reason: &str) {
        *self.reply.lock().unwrap() = Err(reason.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self) -> Result<String, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(|reason| GenerateError::source_unavailable("test://feed", reason))
    }
}

/// Builds every feed from one shared scripted source.
pub struct ScriptedFactory {
    pub source: Arc<ScriptedSource>,
}

impl GeneratorFactory for ScriptedFactory {
    fn build(&self, _descriptor: &FeedDescriptor) -> ContentGenerator {
        ContentGenerator::new(self.source.clone())
    }
}
