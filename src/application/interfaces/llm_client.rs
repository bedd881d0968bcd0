use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::DomainError;

/// A text-generation request. `system` is optional; `temperature` and
/// `max_tokens` participate in cache keys, so they travel with the request
/// rather than living in provider state.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

pub type TextStream = BoxStream<'static, Result<String, DomainError>>;

/// Abstract text-generation capability.
///
/// Decorators compose over this trait: `RetryingLlm` adds backoff,
/// `CachedLlm` adds the similarity cache. `name()` identifies the underlying
/// provider family for logging and prompt selection.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError>;

    /// Streaming variant yielding partial continuations in order. The
    /// concatenation of all yielded fragments equals one `generate` output.
    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError>;
}
