use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use duckdb::{params, Connection};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::application::{EmbeddingService, LlmClient, LlmRequest, TextStream};
use crate::config::LlmCacheConfig;
use crate::domain::{cosine_similarity, DomainError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    prompt_hash: String,
    /// Temperature rounded to 2 decimals; f32 keys don't hash.
    temperature_centi: i32,
    max_tokens: u32,
}

impl CacheKey {
    fn new(system: Option<&str>, prompt: &str, temperature: f32, max_tokens: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(system.unwrap_or("").as_bytes());
        hasher.update(b"\x00");
        hasher.update(prompt.as_bytes());
        Self {
            prompt_hash: format!("{:x}", hasher.finalize()),
            temperature_centi: (temperature * 100.0).round() as i32,
            max_tokens,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    completion: String,
    prompt_embedding: Option<Vec<f32>>,
    inserted_at_epoch: u64,
}

struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Recency order, oldest first. Touched keys move to the back; eviction
    /// pops from the front.
    recency: Vec<CacheKey>,
}

impl CacheState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            let key = self.recency.remove(pos);
            self.recency.push(key);
        }
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry, max_entries: usize) {
        if self.entries.insert(key.clone(), entry).is_none() {
            self.recency.push(key);
        } else {
            self.touch(&key);
        }
        while self.entries.len() > max_entries {
            let oldest = self.recency.remove(0);
            self.entries.remove(&oldest);
        }
    }
}

/// Embedding-similarity cache wrapping any [`LlmClient`].
///
/// Exact hits key on `(sha256(system + "\x00" + prompt), temperature,
/// max_tokens)`. When an embedder is attached, a near-duplicate prompt whose
/// embedding clears the similarity threshold (with matching temperature and
/// max_tokens) also hits. Entries expire by TTL and are evicted LRU past
/// capacity; requests hotter than `max_cacheable_temperature` bypass the
/// cache entirely.
pub struct CachedLlm {
    inner: Arc<dyn LlmClient>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    persistence: Option<Arc<tokio::sync::Mutex<Connection>>>,
    state: Mutex<CacheState>,
    config: LlmCacheConfig,
}

impl CachedLlm {
    pub fn new(inner: Arc<dyn LlmClient>, config: LlmCacheConfig) -> Self {
        Self {
            inner,
            embedder: None,
            persistence: None,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: Vec::new(),
            }),
            config,
        }
    }

    /// Enable similarity lookups using the given embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Persist entries to an `llm_cache` table on the shared store connection,
    /// reloading surviving entries on startup.
    pub async fn with_persistence(
        mut self,
        conn: Arc<tokio::sync::Mutex<Connection>>,
    ) -> Result<Self, DomainError> {
        {
            let guard = conn.lock().await;
            guard
                .execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS llm_cache (
                        prompt_hash TEXT NOT NULL,
                        temperature_centi INTEGER NOT NULL,
                        max_tokens INTEGER NOT NULL,
                        completion TEXT NOT NULL,
                        prompt_embedding TEXT,
                        inserted_at_epoch BIGINT NOT NULL,
                        PRIMARY KEY (prompt_hash, temperature_centi, max_tokens)
                    );
                    "#,
                )
                .map_err(|e| DomainError::store(format!("Failed to create llm_cache table: {}", e)))?;

            let cutoff = now_epoch().saturating_sub(self.config.ttl_seconds);
            let mut stmt = guard
                .prepare(
                    "SELECT prompt_hash, temperature_centi, max_tokens, completion, \
                     prompt_embedding, inserted_at_epoch FROM llm_cache \
                     WHERE inserted_at_epoch >= ? ORDER BY inserted_at_epoch ASC LIMIT ?",
                )
                .map_err(|e| DomainError::store(format!("Failed to prepare cache load: {}", e)))?;
            let mut rows = stmt
                .query(params![cutoff as i64, self.config.max_entries as i64])
                .map_err(|e| DomainError::store(format!("Failed to load llm_cache: {}", e)))?;

            let state = self
                .state
                .get_mut()
                .map_err(|_| DomainError::internal("LLM cache mutex poisoned"))?;
            while let Some(row) = rows
                .next()
                .map_err(|e| DomainError::store(format!("Failed to read cache row: {}", e)))?
            {
                let key = CacheKey {
                    prompt_hash: row
                        .get(0)
                        .map_err(|e| DomainError::store(e.to_string()))?,
                    temperature_centi: row
                        .get::<_, i64>(1)
                        .map_err(|e| DomainError::store(e.to_string()))? as i32,
                    max_tokens: row
                        .get::<_, i64>(2)
                        .map_err(|e| DomainError::store(e.to_string()))? as u32,
                };
                let embedding_raw: Option<String> =
                    row.get(4).map_err(|e| DomainError::store(e.to_string()))?;
                let entry = CacheEntry {
                    completion: row
                        .get(3)
                        .map_err(|e| DomainError::store(e.to_string()))?,
                    prompt_embedding: embedding_raw
                        .and_then(|raw| serde_json::from_str(&raw).ok()),
                    inserted_at_epoch: row
                        .get::<_, i64>(5)
                        .map_err(|e| DomainError::store(e.to_string()))? as u64,
                };
                state.insert(key, entry, self.config.max_entries);
            }
            debug!("Loaded {} LLM cache entries", state.entries.len());
        }

        self.persistence = Some(conn);
        Ok(self)
    }

    fn cacheable(&self, request: &LlmRequest) -> bool {
        self.config.enabled && request.temperature <= self.config.max_cacheable_temperature
    }

    fn lookup(&self, key: &CacheKey, embedding: Option<&[f32]>) -> Option<String> {
        let now = now_epoch();
        // A poisoned map degrades to a miss rather than failing the call.
        let mut state = self.state.lock().ok()?;

        if let Some(entry) = state.entries.get(key) {
            if !self.expired(entry, now) {
                let completion = entry.completion.clone();
                state.touch(key);
                return Some(completion);
            }
            state.entries.remove(key);
            state.recency.retain(|k| k != key);
        }

        // Similarity fallback: same temperature and token budget, embedding
        // within threshold.
        let query = embedding?;
        let mut best: Option<(CacheKey, String, f32)> = None;
        for (candidate_key, entry) in state.entries.iter() {
            if candidate_key.temperature_centi != key.temperature_centi
                || candidate_key.max_tokens != key.max_tokens
                || self.expired(entry, now)
            {
                continue;
            }
            let Some(candidate_embedding) = entry.prompt_embedding.as_deref() else {
                continue;
            };
            let similarity = cosine_similarity(query, candidate_embedding);
            if similarity >= self.config.similarity_threshold
                && best.as_ref().is_none_or(|(_, _, s)| similarity > *s)
            {
                best = Some((candidate_key.clone(), entry.completion.clone(), similarity));
            }
        }

        if let Some((hit_key, completion, similarity)) = best {
            debug!("LLM cache similarity hit ({:.3})", similarity);
            state.touch(&hit_key);
            return Some(completion);
        }
        None
    }

    fn expired(&self, entry: &CacheEntry, now: u64) -> bool {
        now.saturating_sub(entry.inserted_at_epoch) > self.config.ttl_seconds
    }

    async fn store(&self, key: CacheKey, completion: &str, embedding: Option<Vec<f32>>) {
        let entry = CacheEntry {
            completion: completion.to_string(),
            prompt_embedding: embedding,
            inserted_at_epoch: now_epoch(),
        };

        if let Some(conn) = &self.persistence {
            let embedding_json = entry
                .prompt_embedding
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok());
            let guard = conn.lock().await;
            let result = guard.execute(
                "INSERT OR REPLACE INTO llm_cache \
                 (prompt_hash, temperature_centi, max_tokens, completion, prompt_embedding, inserted_at_epoch) \
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    key.prompt_hash,
                    key.temperature_centi as i64,
                    key.max_tokens as i64,
                    entry.completion,
                    embedding_json,
                    entry.inserted_at_epoch as i64,
                ],
            );
            if let Err(e) = result {
                warn!("Failed to persist LLM cache entry: {}", e);
            }
        }

        if let Ok(mut state) = self.state.lock() {
            state.insert(key, entry, self.config.max_entries);
        }
    }

    async fn embed_request(&self, request: &LlmRequest) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        let combined = format!(
            "{}\x00{}",
            request.system.as_deref().unwrap_or(""),
            request.prompt
        );
        match embedder.embed_query(&combined).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!("Cache embedding failed, falling back to exact keys: {}", e);
                None
            }
        }
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl LlmClient for CachedLlm {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &LlmRequest) -> Result<String, DomainError> {
        if !self.cacheable(request) {
            return self.inner.generate(request).await;
        }

        let key = CacheKey::new(
            request.system.as_deref(),
            &request.prompt,
            request.temperature,
            request.max_tokens,
        );

        // The prompt is embedded once per call, shared by lookup and store.
        let embedding = self.embed_request(request).await;

        if let Some(completion) = self.lookup(&key, embedding.as_deref()) {
            return Ok(completion);
        }

        let completion = self.inner.generate(request).await?;
        self.store(key, &completion, embedding).await;
        Ok(completion)
    }

    async fn generate_stream(&self, request: &LlmRequest) -> Result<TextStream, DomainError> {
        if !self.cacheable(request) {
            return self.inner.generate_stream(request).await;
        }

        let key = CacheKey::new(
            request.system.as_deref(),
            &request.prompt,
            request.temperature,
            request.max_tokens,
        );
        let embedding = self.embed_request(request).await;

        // A cache hit streams as a single fragment; misses pass through
        // uncached since the stream is consumed by the caller.
        if let Some(completion) = self.lookup(&key, embedding.as_deref()) {
            return Ok(futures_util::stream::iter(vec![Ok(completion)]).boxed());
        }
        self.inner.generate_stream(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapter::{MockEmbedding, MockLlm};

    fn config() -> LlmCacheConfig {
        LlmCacheConfig {
            enabled: true,
            ttl_seconds: 3600,
            max_entries: 4,
            similarity_threshold: 0.97,
            max_cacheable_temperature: 0.5,
        }
    }

    #[tokio::test]
    async fn test_exact_hit_returns_stored_completion() {
        let mock = Arc::new(MockLlm::with_responses(vec!["answer one", "answer two"]));
        let cache = CachedLlm::new(mock.clone(), config());

        let request = LlmRequest::new("what is the indexer?").with_temperature(0.0);
        assert_eq!(cache.generate(&request).await.unwrap(), "answer one");
        assert_eq!(cache.generate(&request).await.unwrap(), "answer one");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_key_distinguishes_temperature_and_max_tokens() {
        let mock = Arc::new(MockLlm::with_responses(vec!["a", "b", "c"]));
        let cache = CachedLlm::new(mock.clone(), config());

        let base = LlmRequest::new("prompt");
        assert_eq!(cache.generate(&base).await.unwrap(), "a");
        assert_eq!(
            cache.generate(&base.clone().with_temperature(0.2)).await.unwrap(),
            "b"
        );
        assert_eq!(
            cache.generate(&base.clone().with_max_tokens(99)).await.unwrap(),
            "c"
        );
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_similarity_hit_on_identical_text() {
        let mock = Arc::new(MockLlm::with_responses(vec!["cached"]));
        let embedder = Arc::new(MockEmbedding::new());
        let cache = CachedLlm::new(mock.clone(), config()).with_embedder(embedder);

        let request = LlmRequest::new("similar question");
        assert_eq!(cache.generate(&request).await.unwrap(), "cached");
        // Identical embedding text has similarity 1.0, above any threshold.
        assert_eq!(cache.generate(&request).await.unwrap(), "cached");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_high_temperature_bypasses_cache() {
        let mock = Arc::new(MockLlm::with_responses(vec!["x", "y"]));
        let cache = CachedLlm::new(mock.clone(), config());

        let request = LlmRequest::new("prompt").with_temperature(0.9);
        assert_eq!(cache.generate(&request).await.unwrap(), "x");
        assert_eq!(cache.generate(&request).await.unwrap(), "y");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refetches() {
        let mock = Arc::new(MockLlm::with_responses(vec!["first", "second"]));
        let mut cfg = config();
        cfg.ttl_seconds = 0;
        let cache = CachedLlm::new(mock.clone(), cfg);

        let request = LlmRequest::new("prompt");
        assert_eq!(cache.generate(&request).await.unwrap(), "first");
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(cache.generate(&request).await.unwrap(), "second");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction_past_capacity() {
        let mock = Arc::new(MockLlm::new());
        let mut cfg = config();
        cfg.max_entries = 2;
        let cache = CachedLlm::new(mock.clone(), cfg);

        for i in 0..3 {
            cache
                .generate(&LlmRequest::new(format!("prompt {}", i)))
                .await
                .unwrap();
        }
        assert_eq!(mock.call_count(), 3);

        // prompt 0 was evicted; prompts 1 and 2 still hit.
        cache.generate(&LlmRequest::new("prompt 1")).await.unwrap();
        cache.generate(&LlmRequest::new("prompt 2")).await.unwrap();
        assert_eq!(mock.call_count(), 3);
        cache.generate(&LlmRequest::new("prompt 0")).await.unwrap();
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let mock = Arc::new(MockLlm::with_responses(vec!["a", "b"]));
        let mut cfg = config();
        cfg.enabled = false;
        let cache = CachedLlm::new(mock.clone(), cfg);

        let request = LlmRequest::new("prompt");
        cache.generate(&request).await.unwrap();
        cache.generate(&request).await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }
}
