use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::application::{EmbeddingService, VectorStore};
use crate::domain::{DomainError, SearchQuery, SearchResult};

pub struct SearchCodeUseCase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
}

impl SearchCodeUseCase {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingService>) -> Self {
        Self { store, embedder }
    }

    pub async fn execute(&self, query: SearchQuery) -> Result<Vec<SearchResult>, DomainError> {
        if query.query().trim().is_empty() {
            return Err(DomainError::invalid_input("Search query must not be empty"));
        }
        if self.store.count().await? == 0 {
            return Err(DomainError::not_indexed(
                "the vector store contains no chunks",
            ));
        }

        info!("Searching for: {}", query.query());
        let start_time = Instant::now();

        let query_vector = self.embedder.embed_query(query.query()).await?;
        debug!("Query embedded with {} dimensions", query_vector.len());

        let results = self.store.search(&query_vector, &query).await?;

        info!(
            "Found {} results in {:.2}s",
            results.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapter::{InMemoryVectorStore, MockEmbedding};
    use crate::domain::{Chunk, ChunkKind, Embedding, Language};

    async fn seeded_use_case() -> SearchCodeUseCase {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedding::new());

        let chunk = Chunk::new(
            "src/lib.rs",
            Language::Rust,
            ChunkKind::Function,
            "fn authenticate() {}",
            1,
            3,
        )
        .with_name("authenticate");
        let vector = embedder.embed_query(&chunk.embedding_text()).await.unwrap();
        store
            .upsert(
                std::slice::from_ref(&chunk),
                &[Embedding::new(chunk.id().to_string(), vector, "mock".to_string())],
            )
            .await
            .unwrap();

        SearchCodeUseCase::new(store, embedder)
    }

    #[tokio::test]
    async fn test_empty_query_is_invalid() {
        let use_case = seeded_use_case().await;
        let result = use_case.execute(SearchQuery::new("   ")).await;
        assert!(matches!(result, Err(DomainError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_empty_store_reports_not_indexed() {
        let use_case = SearchCodeUseCase::new(
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(MockEmbedding::new()),
        );
        let result = use_case.execute(SearchQuery::new("anything")).await;
        assert!(matches!(result, Err(DomainError::NotIndexed(_))));
    }

    #[tokio::test]
    async fn test_search_returns_stored_chunks() {
        let use_case = seeded_use_case().await;
        let results = use_case
            .execute(SearchQuery::new("authentication").with_limit(5))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk().name(), Some("authenticate"));
    }
}
