use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::VectorStore;
use crate::domain::{
    cosine_similarity, Chunk, DomainError, Embedding, SearchQuery, SearchResult,
};

/// Brute-force cosine store used by tests and small ad-hoc runs. Semantics
/// match the DuckDB adapter: upsert replaces by id, filters are typed enums.
#[derive(Default)]
pub struct InMemoryVectorStore {
    rows: RwLock<HashMap<String, (Chunk, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<(), DomainError> {
        if chunks.len() != embeddings.len() {
            return Err(DomainError::invalid_input(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }
        let mut rows = self.rows.write().await;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            rows.insert(
                chunk.id().to_string(),
                (chunk.clone(), embedding.vector().to_vec()),
            );
        }
        Ok(())
    }

    async fn delete_by_files(&self, paths: &[String]) -> Result<u64, DomainError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, (chunk, _)| !paths.iter().any(|p| p == chunk.file_path()));
        Ok((before - rows.len()) as u64)
    }

    async fn search(
        &self,
        query_vector: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let rows = self.rows.read().await;
        let mut scored: Vec<SearchResult> = rows
            .values()
            .filter(|(chunk, _)| {
                query.language().is_none_or(|l| chunk.language() == l)
                    && query.kind().is_none_or(|k| chunk.kind() == k)
            })
            .map(|(chunk, vector)| {
                SearchResult::new(chunk.clone(), cosine_similarity(query_vector, vector))
            })
            .filter(|r| query.min_score().is_none_or(|min| r.score() >= min))
            .collect();

        scored.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(query.limit());
        Ok(scored)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Chunk>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows.get(id).map(|(chunk, _)| chunk.clone()))
    }

    async fn get_by_file(&self, path: &str) -> Result<Vec<Chunk>, DomainError> {
        let rows = self.rows.read().await;
        let mut chunks: Vec<Chunk> = rows
            .values()
            .filter(|(chunk, _)| chunk.file_path() == path)
            .map(|(chunk, _)| chunk.clone())
            .collect();
        chunks.sort_by(|a, b| {
            a.start_line()
                .cmp(&b.start_line())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(chunks)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        Ok(self.rows.read().await.len() as u64)
    }

    async fn list_files(&self) -> Result<Vec<String>, DomainError> {
        let rows = self.rows.read().await;
        let mut files: Vec<String> = rows
            .values()
            .map(|(chunk, _)| chunk.file_path().to_string())
            .collect();
        files.sort();
        files.dedup();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkKind, Language};

    fn chunk(path: &str, name: &str, kind: ChunkKind) -> Chunk {
        Chunk::new(path, Language::Rust, kind, format!("fn {}() {{}}", name), 1, 3)
            .with_name(name)
    }

    fn embedding(chunk: &Chunk, vector: Vec<f32>) -> Embedding {
        Embedding::new(chunk.id().to_string(), vector, "mock".to_string())
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        let a = chunk("a.rs", "f", ChunkKind::Function);
        store
            .upsert(std::slice::from_ref(&a), &[embedding(&a, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert(std::slice::from_ref(&a), &[embedding(&a, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity_and_filters() {
        let store = InMemoryVectorStore::new();
        let near = chunk("a.rs", "near", ChunkKind::Function);
        let far = chunk("b.rs", "far", ChunkKind::Class);
        store
            .upsert(
                &[near.clone(), far.clone()],
                &[embedding(&near, vec![1.0, 0.0]), embedding(&far, vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.1], &SearchQuery::new("q").with_limit(10))
            .await
            .unwrap();
        assert_eq!(results[0].chunk().name(), Some("near"));
        assert!(results[0].score() >= results[1].score());

        let filtered = store
            .search(
                &[1.0, 0.1],
                &SearchQuery::new("q").with_kind(ChunkKind::Class),
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chunk().name(), Some("far"));
    }

    #[tokio::test]
    async fn test_delete_by_files() {
        let store = InMemoryVectorStore::new();
        let a = chunk("a.rs", "f", ChunkKind::Function);
        let b = chunk("b.rs", "g", ChunkKind::Function);
        store
            .upsert(
                &[a.clone(), b.clone()],
                &[embedding(&a, vec![1.0]), embedding(&b, vec![1.0])],
            )
            .await
            .unwrap();

        let deleted = store.delete_by_files(&["a.rs".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.list_files().await.unwrap(), vec!["b.rs".to_string()]);
    }
}
