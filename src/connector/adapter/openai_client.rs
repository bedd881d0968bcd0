use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::warn;

use crate::application::{LlmClient, LlmRequest, TextStream};
use crate::connector::adapter::http_stream;
use crate::domain::DomainError;

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
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
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the OpenAI Chat Completions API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, DomainError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            DomainError::invalid_input("OPENAI_API_KEY is required for the openai provider")
        })?;
        Ok(Self::new(key, model))
    }

    fn build_messages<'a>(request: &'a LlmRequest) -> Vec<ApiMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ApiMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: &request.prompt,
        });
        messages
    }

    async fn send(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<reqwest::Response, DomainError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: Self::build_messages(request),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        };

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| DomainError::llm(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI API returned {status}: {body}");
            return Err(DomainError::llm(format!("OpenAI API returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        let response = self.send(request, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("Failed to parse OpenAI response: {}", e)))?;

        Ok(api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        let response = self.send(request, true).await?;

        let stream = http_stream::lines(response)
            .filter_map(|line| {
                let fragment = line.map(|line| {
                    let data = http_stream::sse_data(&line)?;
                    if data.trim() == "[DONE]" {
                        return None;
                    }
                    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
                    chunk.choices.into_iter().next().and_then(|c| c.delta.content)
                });
                futures_util::future::ready(match fragment {
                    Ok(Some(text)) if !text.is_empty() => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            })
            .boxed();

        Ok(stream)
    }
}
