use async_trait::async_trait;

use crate::domain::{Chunk, DomainError, Embedding, SearchQuery, SearchResult};

/// Persistent chunk storage with filtered k-NN search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a batch of chunks with their vectors. Conflict on `id` replaces
    /// the stored row. The batch is applied atomically.
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<(), DomainError>;

    /// Purge every chunk whose `file_path` is in `paths`. Returns the number
    /// of rows deleted.
    async fn delete_by_files(&self, paths: &[String]) -> Result<u64, DomainError>;

    /// Top-k cosine search over the given query vector, with the query's
    /// enum-validated language/kind filters applied.
    async fn search(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Chunk>, DomainError>;

    /// All chunks for one file, ordered by start line. Used by the wiki
    /// generator's file pages and entity registry.
    async fn get_by_file(&self, path: &str) -> Result<Vec<Chunk>, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;

    /// Distinct file paths present in the store, for status reporting.
    async fn list_files(&self) -> Result<Vec<String>, DomainError>;
}
