use async_trait::async_trait;

use crate::domain::{Chunk, DomainError, Embedding, EmbeddingConfig};

/// Generates fixed-dimension vectors from text batches.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts. All returned vectors have
    /// `config().dimensions()` elements, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    /// Embed chunks using their canonical embedding text.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>, DomainError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.embedding_text()).collect();
        let vectors = self.embed_texts(&texts).await?;
        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                Embedding::new(
                    chunk.id().to_string(),
                    vector,
                    self.config().model_name().to_string(),
                )
            })
            .collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, DomainError> {
        let texts = [query.to_string()];
        let vectors = self.embed_texts(&texts).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("Provider returned no vector for query"))
    }

    fn config(&self) -> &EmbeddingConfig;
}
