use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::warn;

use crate::application::{LlmClient, LlmRequest, TextStream};
use crate::connector::adapter::http_stream;
use crate::domain::DomainError;

const GENERATE_PATH: &str = "/api/generate";

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: ApiOptions,
}

#[derive(serde::Serialize)]
struct ApiOptions {
    temperature: f32,
    num_predict: u32,
}

/// One NDJSON line of an Ollama response; the final line has `done: true`.
#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// Client for a local Ollama daemon over HTTP.
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    url: String,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        let url = format!("{}{}", base.trim_end_matches('/'), GENERATE_PATH);
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(600))
                .build()
                .unwrap_or_default(),
            model: model.into(),
            url,
        }
    }

    async fn send(
        &self,
        request: &LlmRequest,
        stream: bool,
    ) -> Result<reqwest::Response, DomainError> {
        let api_request = ApiRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream,
            options: ApiOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| DomainError::llm(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Ollama API returned {status}: {body}");
            return Err(DomainError::llm(format!("Ollama API returned {status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        let response = self.send(request, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DomainError::llm(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(api_response.response)
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        let response = self.send(request, true).await?;

        let stream = http_stream::lines(response)
            .filter_map(|line| {
                let fragment = line.map(|line| {
                    let parsed: ApiResponse = serde_json::from_str(&line).ok()?;
                    if parsed.done && parsed.response.is_empty() {
                        return None;
                    }
                    Some(parsed.response)
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
