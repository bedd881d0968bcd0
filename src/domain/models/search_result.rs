use serde::{Deserialize, Serialize};

use super::{Chunk, ChunkKind, Language};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    chunk: Chunk,
    score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn into_chunk(self) -> Chunk {
        self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn display_line(&self) -> String {
        format!("{} (score: {:.3})", self.chunk.location(), self.score)
    }
}

/// A semantic search request. Filters are typed enums, validated before the
/// query is handed to a store adapter, so no caller-supplied string ever
/// reaches the store's filter language.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    query: String,
    limit: usize,
    language: Option<Language>,
    kind: Option<ChunkKind>,
    min_score: Option<f32>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            language: None,
            kind: None,
            min_score: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn kind(&self) -> Option<ChunkKind> {
        self.kind
    }

    pub fn min_score(&self) -> Option<f32> {
        self.min_score
    }

    pub fn has_filters(&self) -> bool {
        self.language.is_some() || self.kind.is_some()
    }
}
