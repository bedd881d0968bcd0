use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::warn;

use crate::application::{LlmClient, LlmRequest, TextStream};
use crate::connector::adapter::http_stream;
use crate::domain::DomainError;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(serde::Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

/// One SSE event in a streamed response; only text deltas carry output.
#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for the Anthropic Messages API.
///
/// `ANTHROPIC_BASE_URL` may point at any Messages-compatible server; the API
/// key comes from `ANTHROPIC_API_KEY`.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base: String = base_url.into();
        let url = format!("{}{}", base.trim_end_matches('/'), MESSAGES_PATH);
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
            url,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, DomainError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            DomainError::invalid_input("ANTHROPIC_API_KEY is required for the anthropic provider")
        })?;
        let base =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Ok(Self::new(key, model, base))
    }

    fn build_request<'a>(&'a self, request: &'a LlmRequest, stream: bool) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.as_deref(),
            messages: vec![ApiMessage {
                role: "user",
                content: &request.prompt,
            }],
            stream,
        }
    }

    async fn send(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<reqwest::Response, DomainError> {
        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&self.build_request(request, stream))
            .send()
            .await
            .map_err(|e| DomainError::llm(format!("Anthropic request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Anthropic API returned {status}: {body}");
            return Err(DomainError::llm(format!(
                "Anthropic API returned {status}: {body}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        let response = self.send(request, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("Failed to parse Anthropic response: {}", e)))?;

        Ok(api_response
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        let response = self.send(request, true).await?;

        let stream = http_stream::lines(response)
            .filter_map(|line| {
                let fragment = line.map(|line| {
                    let data = http_stream::sse_data(&line)?;
                    let event: StreamEvent = serde_json::from_str(data).ok()?;
                    if event.event_type != "content_block_delta" {
                        return None;
                    }
                    event.delta.and_then(|d| d.text)
                });
                futures_util::future::ready(match fragment {
                    Ok(Some(text)) => Some(Ok(text)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed();

        Ok(stream)
    }
}
