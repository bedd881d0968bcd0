use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::error;

use crate::application::facade::validation::{
    clamped_int, optional_bool, optional_enum, optional_language, optional_languages, require_str,
    resolve_wiki_page, ToolArgs,
};
use crate::application::use_cases::{
    AskQuestionUseCase, DeepResearchUseCase, IndexOptions, IndexRepositoryUseCase, ResearchOptions,
    SearchCodeUseCase,
};
use crate::application::wiki::{build_toc, WikiGenerator, WikiOptions};
use crate::application::{EmbeddingService, LlmClient, ParserService, VectorStore};
use crate::config::DeepResearchConfig;
use crate::domain::{DomainError, ResearchProgress, SearchQuery};

const LLM_PROVIDERS: &[&str] = &["ollama", "anthropic", "openai"];
const EMBEDDING_PROVIDERS: &[&str] = &["local", "openai"];

/// One typed content item returned by a tool handler.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text { text: String },
    Json { value: serde_json::Value },
}

/// A search hit as surfaced over the tool boundary.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchResultOutput {
    /// Path to the file containing the code
    pub file_path: String,
    /// Starting line number (1-indexed)
    pub start_line: u32,
    /// Ending line number (1-indexed)
    pub end_line: u32,
    /// Relevance score (0.0 to 1.0)
    pub score: f32,
    /// Programming language of the code
    pub language: String,
    /// Chunk kind (module, import, class, method, function)
    pub chunk_type: String,
    /// Entity name, when the chunk is named
    pub name: Option<String>,
    /// The chunk content
    pub content: String,
}

/// Opens the per-repository vector store consumed by the handlers.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn open(&self, repo_path: &Path) -> Result<Arc<dyn VectorStore>, DomainError>;
}

/// The request surface consumed by the external façade: one async handler per
/// tool, each taking a key/value argument map and returning typed content.
///
/// Provider maps let `index_repository` honor per-request `llm_provider` /
/// `embedding_provider` overrides from the set the hosting process
/// constructed at startup.
pub struct ToolHandlers {
    parser: Arc<dyn ParserService>,
    store_provider: Arc<dyn StoreProvider>,
    embedders: HashMap<String, Arc<dyn EmbeddingService>>,
    default_embedder: String,
    llms: HashMap<String, Arc<dyn LlmClient>>,
    default_llm: String,
}

impl ToolHandlers {
    pub fn new(
        parser: Arc<dyn ParserService>,
        store_provider: Arc<dyn StoreProvider>,
        default_embedder: (String, Arc<dyn EmbeddingService>),
        default_llm: (String, Arc<dyn LlmClient>),
    ) -> Self {
        let mut embedders = HashMap::new();
        embedders.insert(default_embedder.0.clone(), default_embedder.1);
        let mut llms = HashMap::new();
        llms.insert(default_llm.0.clone(), default_llm.1);
        Self {
            parser,
            store_provider,
            embedders,
            default_embedder: default_embedder.0,
            llms,
            default_llm: default_llm.0,
        }
    }

    pub fn with_embedder(mut self, name: impl Into<String>, embedder: Arc<dyn EmbeddingService>) -> Self {
        self.embedders.insert(name.into(), embedder);
        self
    }

    pub fn with_llm(mut self, name: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        self.llms.insert(name.into(), llm);
        self
    }

    fn embedder(&self, name: Option<&str>) -> Result<Arc<dyn EmbeddingService>, DomainError> {
        let name = name.unwrap_or(&self.default_embedder);
        self.embedders.get(name).cloned().ok_or_else(|| {
            DomainError::invalid_input(format!(
                "Embedding provider '{}' is not configured in this process",
                name
            ))
        })
    }

    fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmClient>, DomainError> {
        let name = name.unwrap_or(&self.default_llm);
        self.llms.get(name).cloned().ok_or_else(|| {
            DomainError::invalid_input(format!(
                "LLM provider '{}' is not configured in this process",
                name
            ))
        })
    }

    /// Uniform error boundary: `InvalidInput` surfaces verbatim, unexpected
    /// errors are logged and replaced by a generic message, and cancellation
    /// re-raises to the dispatcher.
    pub async fn dispatch(
        &self,
        tool: &str,
        args: ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let result = match tool {
            "index_repository" => self.handle_index_repository(&args).await,
            "ask_question" => self.handle_ask_question(&args).await,
            "deep_research" => self.handle_deep_research(&args, None).await,
            "read_wiki_structure" => self.handle_read_wiki_structure(&args).await,
            "read_wiki_page" => self.handle_read_wiki_page(&args).await,
            "search_code" => self.handle_search_code(&args).await,
            other => Err(DomainError::invalid_input(format!("Unknown tool '{}'", other))),
        };

        match result {
            Ok(content) => Ok(content),
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) if e.is_invalid_input() => Ok(vec![ToolContent::Text {
                text: format!("Error: {}", e),
            }]),
            Err(e @ DomainError::NotIndexed(_)) => Ok(vec![ToolContent::Text {
                text: format!("Error: {}", e),
            }]),
            Err(e) => {
                error!("Tool '{}' failed: {:?}", tool, e);
                Ok(vec![ToolContent::Text {
                    text: "Error: an internal error occurred; see server logs.".to_string(),
                }])
            }
        }
    }

    pub async fn handle_index_repository(
        &self,
        args: &ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let repo_path = require_str(args, "repo_path")?;
        let languages = optional_languages(args, "languages")?;
        let full_rebuild = optional_bool(args, "full_rebuild")?;
        let llm_name = optional_enum(args, "llm_provider", LLM_PROVIDERS)?;
        let embedder_name = optional_enum(args, "embedding_provider", EMBEDDING_PROVIDERS)?;

        let embedder = self.embedder(embedder_name.as_deref())?;
        let llm = self.llm(llm_name.as_deref())?;
        let store = self.store_provider.open(Path::new(&repo_path)).await?;

        let indexer =
            IndexRepositoryUseCase::new(Arc::clone(&self.parser), Arc::clone(&embedder), Arc::clone(&store));
        let status = indexer
            .execute(
                Path::new(&repo_path),
                IndexOptions {
                    languages,
                    full_rebuild,
                    ..Default::default()
                },
            )
            .await?;

        let generator = WikiGenerator::new(store, embedder, llm);
        let wiki = generator
            .execute(Path::new(&repo_path), WikiOptions::default())
            .await?;

        Ok(vec![
            ToolContent::Text {
                text: format!(
                    "Indexed {} files ({} chunks); wiki: {} pages regenerated, {} reused.",
                    status.total_files,
                    status.total_chunks,
                    wiki.regenerated.len(),
                    wiki.reused.len()
                ),
            },
            ToolContent::Json {
                value: serde_json::json!({
                    "total_files": status.total_files,
                    "total_chunks": status.total_chunks,
                    "files_by_language": status.files_by_language,
                    "wiki_regenerated": wiki.regenerated,
                    "wiki_reused": wiki.reused,
                }),
            },
        ])
    }

    pub async fn handle_ask_question(
        &self,
        args: &ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let repo_path = require_str(args, "repo_path")?;
        let question = require_str(args, "question")?;
        let max_context = clamped_int(args, "max_context", 1, 20, 5)?;

        let store = self.store_provider.open(Path::new(&repo_path)).await?;
        let use_case = AskQuestionUseCase::new(store, self.embedder(None)?, self.llm(None)?);
        let answer = use_case.execute(&question, max_context).await?;

        Ok(vec![
            ToolContent::Text {
                text: answer.answer,
            },
            ToolContent::Json {
                value: serde_json::json!({
                    "sources": answer
                        .sources
                        .iter()
                        .map(|s| s.citation())
                        .collect::<Vec<_>>(),
                }),
            },
        ])
    }

    pub async fn handle_deep_research(
        &self,
        args: &ToolArgs,
        progress: Option<mpsc::Sender<ResearchProgress>>,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let repo_path = require_str(args, "repo_path")?;
        let question = require_str(args, "question")?;
        let preset = optional_enum(args, "preset", DeepResearchConfig::preset_names())?;

        let mut research_config = preset
            .as_deref()
            .and_then(DeepResearchConfig::preset)
            .unwrap_or_else(|| crate::config::current().deep_research);
        let max_chunks = clamped_int(
            args,
            "max_chunks",
            1,
            200,
            research_config.max_total_chunks,
        )?;
        research_config.max_total_chunks = max_chunks;

        let store = self.store_provider.open(Path::new(&repo_path)).await?;
        let use_case = DeepResearchUseCase::new(store, self.embedder(None)?, self.llm(None)?);
        let result = use_case
            .execute(
                &question,
                ResearchOptions {
                    config: Some(research_config),
                    progress,
                    ..Default::default()
                },
            )
            .await?;

        Ok(vec![
            ToolContent::Text {
                text: result.answer.clone(),
            },
            ToolContent::Json {
                value: serde_json::to_value(&result)
                    .map_err(|e| DomainError::internal(format!("Serialization failed: {}", e)))?,
            },
        ])
    }

    pub async fn handle_read_wiki_structure(
        &self,
        args: &ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let wiki_path = require_str(args, "wiki_path")?;
        let root = Path::new(&wiki_path);

        let toc_file = root.join("toc.json");
        let toc_value: serde_json::Value = match tokio::fs::read_to_string(&toc_file).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| DomainError::store(format!("Corrupt toc.json: {}", e)))?,
            // Dynamic fallback: list the markdown pages that exist on disk.
            Err(_) => {
                let pages = list_markdown_pages(root).await?;
                let catalog: Vec<(String, String)> = pages
                    .iter()
                    .filter(|p| !p.starts_with("files/"))
                    .map(|p| (p.clone(), p.trim_end_matches(".md").to_string()))
                    .collect();
                let file_pages: Vec<String> = pages
                    .iter()
                    .filter(|p| p.starts_with("files/"))
                    .cloned()
                    .collect();
                serde_json::to_value(build_toc(&catalog, &file_pages))
                    .map_err(|e| DomainError::internal(format!("Serialization failed: {}", e)))?
            }
        };

        Ok(vec![ToolContent::Json { value: toc_value }])
    }

    pub async fn handle_read_wiki_page(
        &self,
        args: &ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let wiki_path = require_str(args, "wiki_path")?;
        let page = require_str(args, "page")?;

        let resolved = resolve_wiki_page(Path::new(&wiki_path), &page)?;
        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| DomainError::invalid_input(format!("Cannot read page '{}': {}", page, e)))?;

        Ok(vec![ToolContent::Text { text: content }])
    }

    pub async fn handle_search_code(
        &self,
        args: &ToolArgs,
    ) -> Result<Vec<ToolContent>, DomainError> {
        let repo_path = require_str(args, "repo_path")?;
        let query_text = require_str(args, "query")?;
        let limit = clamped_int(args, "limit", 1, 50, 10)?;
        let language = optional_language(args, "language")?;

        let store = self.store_provider.open(Path::new(&repo_path)).await?;
        let use_case = SearchCodeUseCase::new(store, self.embedder(None)?);

        let mut query = SearchQuery::new(&query_text).with_limit(limit);
        if let Some(language) = language {
            query = query.with_language(language);
        }
        let results = use_case.execute(query).await?;

        let outputs: Vec<SearchResultOutput> = results
            .iter()
            .map(|r| SearchResultOutput {
                file_path: r.chunk().file_path().to_string(),
                start_line: r.chunk().start_line(),
                end_line: r.chunk().end_line(),
                score: r.score(),
                language: r.chunk().language().to_string(),
                chunk_type: r.chunk().kind().to_string(),
                name: r.chunk().name().map(String::from),
                content: r.chunk().content().to_string(),
            })
            .collect();

        Ok(vec![ToolContent::Json {
            value: serde_json::to_value(&outputs)
                .map_err(|e| DomainError::internal(format!("Serialization failed: {}", e)))?,
        }])
    }
}

async fn list_markdown_pages(root: &Path) -> Result<Vec<String>, DomainError> {
    let mut pages = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| {
            DomainError::invalid_input(format!("Cannot read wiki path {}: {}", dir.display(), e))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::store(e.to_string()))?
        {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
                pages.push(
                    path.strip_prefix(root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    pages.sort();
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_content_serialization() {
        let text = ToolContent::Text {
            text: "hello".to_string(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");

        let value = ToolContent::Json {
            value: serde_json::json!({"k": 1}),
        };
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "json");
    }

    #[test]
    fn test_search_result_output_serialization() {
        let output = SearchResultOutput {
            file_path: "src/lib.rs".to_string(),
            start_line: 10,
            end_line: 20,
            score: 0.95,
            language: "rust".to_string(),
            chunk_type: "function".to_string(),
            name: Some("authenticate".to_string()),
            content: "fn authenticate() {}".to_string(),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("authenticate"));
        assert!(json.contains("src/lib.rs"));
    }
}
