use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::application::{LlmClient, LlmRequest, TextStream};
use crate::domain::DomainError;

/// Scripted LLM for tests: returns queued responses in order, then a fixed
/// fallback. Records every request so tests can assert call counts and
/// prompt contents.
pub struct MockLlm {
    responses: Mutex<VecDeque<Result<String, DomainError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicU64,
    fallback: String,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
            fallback: "mock response".to_string(),
        }
    }

    pub fn with_responses(responses: Vec<&str>) -> Self {
        let mock = Self::new();
        {
            let mut queue = mock.responses.lock().unwrap();
            for response in responses {
                queue.push_back(Ok(response.to_string()));
            }
        }
        mock
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: DomainError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        let text = self.generate(request).await?;
        let fragments: Vec<Result<String, DomainError>> = text
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(futures_util::stream::iter(fragments).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let mock = MockLlm::with_responses(vec!["first", "second"]);
        let request = LlmRequest::new("q");
        assert_eq!(mock.generate(&request).await.unwrap(), "first");
        assert_eq!(mock.generate(&request).await.unwrap(), "second");
        assert_eq!(mock.generate(&request).await.unwrap(), "mock response");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_concatenates_to_generate_output() {
        let mock = MockLlm::with_responses(vec!["hello streaming world"]);
        let stream = mock.generate_stream(&LlmRequest::new("q")).await.unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments.join(""), "hello streaming world");
    }
}
