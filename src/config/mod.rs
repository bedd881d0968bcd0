//! Process-wide configuration, loaded once from a YAML file with serde
//! defaults for every omitted section. Tests scope an override with
//! [`with_config_override`] instead of mutating global state.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingProviderConfig {
    /// `local` (ONNX sentence-transformer) or `openai`.
    pub provider: String,
    pub local: LocalEmbeddingConfig,
    pub openai: OpenAiEmbeddingConfig,
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            local: LocalEmbeddingConfig::default(),
            openai: OpenAiEmbeddingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalEmbeddingConfig {
    pub model: String,
    /// Optional base URL when the model files are served from a local mirror
    /// instead of the HuggingFace hub.
    pub base_url: Option<String>,
}

impl Default for LocalEmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiEmbeddingConfig {
    pub model: String,
}

impl Default for OpenAiEmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    /// `ollama`, `anthropic`, or `openai`.
    pub provider: String,
    pub ollama: OllamaConfig,
    pub anthropic: AnthropicConfig,
    pub openai: OpenAiConfig,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama: OllamaConfig::default(),
            anthropic: AnthropicConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub base_url: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:7b".to_string(),
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmCacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_entries: usize,
    pub similarity_threshold: f32,
    /// Requests hotter than this bypass the cache entirely.
    pub max_cacheable_temperature: f32,
}

impl Default for LlmCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 7 * 24 * 3600,
            max_entries: 2048,
            similarity_threshold: 0.97,
            max_cacheable_temperature: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Empty means every supported language.
    pub languages: Vec<String>,
    pub max_file_size: u64,
    pub exclude_patterns: Vec<String>,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            languages: vec![],
            max_file_size: 1_000_000,
            exclude_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/dist/**".to_string(),
                "**/.git/**".to_string(),
                "**/vendor/**".to_string(),
                "**/__pycache__/**".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_tokens: usize,
    pub overlap_tokens: usize,
    /// Files per indexing batch (parse → embed → upsert).
    pub batch_size: usize,
    /// Classes longer than this many raw lines split into summary + methods.
    pub class_split_threshold: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_tokens: 2048,
            overlap_tokens: 64,
            batch_size: 16,
            class_split_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Cap on generated per-file pages; the largest files win.
    pub max_file_docs: usize,
    pub max_concurrent_llm_calls: usize,
    pub use_cloud_for_github: bool,
    pub import_search_limit: usize,
    pub context_search_limit: usize,
    pub fallback_search_limit: usize,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            max_file_docs: 200,
            max_concurrent_llm_calls: 4,
            use_cloud_for_github: false,
            import_search_limit: 20,
            context_search_limit: 12,
            fallback_search_limit: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepResearchConfig {
    pub max_sub_questions: usize,
    pub chunks_per_subquestion: usize,
    pub max_total_chunks: usize,
    pub max_follow_up_queries: usize,
    pub synthesis_temperature: f32,
    pub synthesis_max_tokens: u32,
}

impl Default for DeepResearchConfig {
    fn default() -> Self {
        Self {
            max_sub_questions: 5,
            chunks_per_subquestion: 8,
            max_total_chunks: 40,
            max_follow_up_queries: 3,
            synthesis_temperature: 0.3,
            synthesis_max_tokens: 4096,
        }
    }
}

impl DeepResearchConfig {
    /// Named preset profiles overriding the numeric caps.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "quick" => Some(Self {
                max_sub_questions: 2,
                chunks_per_subquestion: 5,
                max_total_chunks: 15,
                max_follow_up_queries: 0,
                ..Self::default()
            }),
            "default" => Some(Self::default()),
            "thorough" => Some(Self {
                max_sub_questions: 8,
                chunks_per_subquestion: 10,
                max_total_chunks: 80,
                max_follow_up_queries: 5,
                synthesis_max_tokens: 8192,
                ..Self::default()
            }),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &["quick", "default", "thorough"]
    }
}

/// Prompt templates for one provider family. Empty string means "use the
/// built-in default for that template".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub wiki_system: String,
    pub research_decomposition: String,
    pub research_gap_analysis: String,
    pub research_synthesis: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub ollama: PromptSet,
    pub anthropic: PromptSet,
    pub openai: PromptSet,
}

impl PromptsConfig {
    pub fn for_provider(&self, name: &str) -> &PromptSet {
        match name {
            "anthropic" => &self.anthropic,
            "openai" => &self.openai,
            _ => &self.ollama,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Wiki directory, relative to `<repo>/.deepwiki/` unless absolute.
    pub wiki_dir: String,
    pub vector_db_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            wiki_dir: ".".to_string(),
            vector_db_name: "vectors.duckdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingProviderConfig,
    pub llm: LlmProviderConfig,
    pub llm_cache: LlmCacheConfig,
    pub parsing: ParsingConfig,
    pub chunking: ChunkingConfig,
    pub wiki: WikiConfig,
    pub deep_research: DeepResearchConfig,
    pub prompts: PromptsConfig,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, DomainError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::invalid_input(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| DomainError::invalid_input(format!("Invalid config YAML: {}", e)))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self.embedding.provider.as_str() {
            "local" | "openai" => {}
            other => {
                return Err(DomainError::invalid_input(format!(
                    "Unknown embedding provider '{}' (expected local or openai)",
                    other
                )))
            }
        }
        match self.llm.provider.as_str() {
            "ollama" | "anthropic" | "openai" => {}
            other => {
                return Err(DomainError::invalid_input(format!(
                    "Unknown llm provider '{}' (expected ollama, anthropic or openai)",
                    other
                )))
            }
        }
        for lang in &self.parsing.languages {
            if crate::domain::Language::parse_strict(lang).is_none() {
                return Err(DomainError::invalid_input(format!(
                    "Unknown language '{}' in parsing.languages",
                    lang
                )));
            }
        }
        Ok(())
    }
}

static GLOBAL: OnceLock<Arc<Config>> = OnceLock::new();

tokio::task_local! {
    static OVERRIDE: Arc<Config>;
}

/// Install the process-wide configuration. Later calls are ignored, matching
/// startup-once semantics.
pub fn init(config: Config) -> Arc<Config> {
    GLOBAL.get_or_init(|| Arc::new(config)).clone()
}

/// The configuration visible to the current task: a task-local override when
/// one is in scope, otherwise the process-wide value (defaults if `init` was
/// never called).
pub fn current() -> Arc<Config> {
    OVERRIDE
        .try_with(|c| c.clone())
        .unwrap_or_else(|_| GLOBAL.get_or_init(|| Arc::new(Config::default())).clone())
}

/// Run `fut` with `config` visible through [`current`] inside this task only.
pub async fn with_config_override<F, T>(config: Config, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    OVERRIDE.scope(Arc::new(config), fut).await
}
