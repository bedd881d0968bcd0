use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::EmbeddingService;
use crate::domain::{DomainError, EmbeddingConfig};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;
/// The API accepts up to 2048 inputs per request; stay well under it.
const API_BATCH: usize = 256;

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Deserialize)]
struct ApiEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

/// Remote batched embedder over the OpenAI embeddings API.
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    config: EmbeddingConfig,
}

impl OpenAiEmbedding {
    pub fn new(api_key: impl Into<String>, model: Option<&str>) -> Self {
        let model = model.unwrap_or(DEFAULT_MODEL);
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            config: EmbeddingConfig::new(model.to_string(), DEFAULT_DIMENSIONS, 8192),
        }
    }

    pub fn from_env(model: Option<&str>) -> Result<Self, DomainError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            DomainError::invalid_input("OPENAI_API_KEY is required for the openai embedding provider")
        })?;
        Ok(Self::new(key, model))
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let request = ApiRequest {
            model: self.config.model_name(),
            input: batch,
        };

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| DomainError::embedding(format!("OpenAI embeddings request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("OpenAI embeddings API returned {status}: {body}");
            return Err(DomainError::embedding(format!(
                "OpenAI embeddings API returned {status}"
            )));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            DomainError::embedding(format!("Failed to parse embeddings response: {}", e))
        })?;

        if api_response.data.len() != batch.len() {
            return Err(DomainError::embedding(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                api_response.data.len()
            )));
        }

        // Responses carry an index; sort defensively before unzipping.
        let mut data = api_response.data;
        data.sort_by_key(|e| e.index);
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedding {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all_vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(API_BATCH) {
            all_vectors.extend(self.embed_batch(batch).await?);
        }
        debug!("Embedded {} texts via OpenAI", texts.len());
        Ok(all_vectors)
    }

    fn config(&self) -> &EmbeddingConfig {
        &self.config
    }
}
