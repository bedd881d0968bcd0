use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use crate::application::{LlmClient, LlmRequest, TextStream};
use crate::domain::DomainError;

/// Error-text markers treated as transient provider conditions.
const RETRYABLE_MARKERS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "429",
    "500",
    "502",
    "503",
    "529",
    "overloaded",
    "timeout",
    "timed out",
    "connection",
];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 25% additive jitter, capped.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        let capped = exp.min(self.max_delay);
        let jitter = capped.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
        (capped + jitter).min(self.max_delay)
    }
}

/// Decorator adding exponential-backoff retries to any [`LlmClient`].
///
/// Retryable: network/timeout failures, provider overload responses, and any
/// error whose text carries a rate-limit marker. Cancellation and input
/// errors re-raise immediately.
pub struct RetryingLlm {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
}

impl RetryingLlm {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn is_retryable(error: &DomainError) -> bool {
        if error.is_cancellation() || error.is_invalid_input() {
            return false;
        }
        match error {
            DomainError::Llm(msg) | DomainError::Embedding(msg) => {
                let lower = msg.to_lowercase();
                RETRYABLE_MARKERS.iter().any(|m| lower.contains(m))
            }
            DomainError::Io(_) => true,
            _ => false,
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlm {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request).await {
                Ok(text) => return Ok(text),
                Err(e) if Self::is_retryable(&e) && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "LLM call failed (attempt {}/{}), retrying in {:.1}s: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        // Only connection establishment is retried; a stream that fails
        // mid-flight surfaces to the caller.
        let mut attempt = 0;
        loop {
            match self.inner.generate_stream(request).await {
                Ok(stream) => return Ok(stream),
                Err(e) if Self::is_retryable(&e) && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "LLM stream open failed (attempt {}/{}), retrying in {:.1}s: {}",
                        attempt + 1,
                        self.policy.max_attempts,
                        delay.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapter::MockLlm;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let mock = Arc::new(MockLlm::new());
        mock.push_error(DomainError::llm("429 rate limit exceeded"));
        mock.push_error(DomainError::llm("server overloaded"));
        mock.push_response("recovered");

        let retrying = RetryingLlm::new(mock.clone()).with_policy(fast_policy());
        let text = retrying.generate(&LlmRequest::new("q")).await.unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_surface_last_error() {
        let mock = Arc::new(MockLlm::new());
        for _ in 0..3 {
            mock.push_error(DomainError::llm("503 service unavailable"));
        }

        let retrying = RetryingLlm::new(mock.clone()).with_policy(fast_policy());
        let result = retrying.generate(&LlmRequest::new("q")).await;
        assert!(matches!(result, Err(DomainError::Llm(_))));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let mock = Arc::new(MockLlm::new());
        mock.push_error(DomainError::llm("invalid model name"));

        let retrying = RetryingLlm::new(mock.clone()).with_policy(fast_policy());
        assert!(retrying.generate(&LlmRequest::new("q")).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_is_never_retried() {
        let mock = Arc::new(MockLlm::new());
        mock.push_error(DomainError::Cancelled);

        let retrying = RetryingLlm::new(mock.clone()).with_policy(fast_policy());
        let result = retrying.generate(&LlmRequest::new("q")).await;
        assert!(matches!(result, Err(DomainError::Cancelled)));
        assert_eq!(mock.call_count(), 1);
    }
}
