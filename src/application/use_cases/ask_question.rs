use std::sync::Arc;

use tracing::info;

use crate::application::{prompts, EmbeddingService, LlmClient, LlmRequest, VectorStore};
use crate::config;
use crate::domain::{DomainError, SearchQuery, SourceReference};

/// Single-retrieval RAG: one search, one synthesis call.
pub struct AskQuestionUseCase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Clone)]
pub struct AskAnswer {
    pub answer: String,
    pub sources: Vec<SourceReference>,
}

impl AskQuestionUseCase {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
        }
    }

    pub async fn execute(
        &self,
        question: &str,
        max_context: usize,
    ) -> Result<AskAnswer, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::invalid_input("Question must not be empty"));
        }
        if self.store.count().await? == 0 {
            return Err(DomainError::not_indexed(
                "the vector store contains no chunks",
            ));
        }

        let query_vector = self.embedder.embed_query(question).await?;
        let results = self
            .store
            .search(
                &query_vector,
                &SearchQuery::new(question).with_limit(max_context),
            )
            .await?;

        info!("Answering with {} context chunks", results.len());

        let sources: Vec<SourceReference> = results
            .iter()
            .map(|r| SourceReference::from_chunk(r.chunk(), r.score()))
            .collect();

        let evidence = results
            .iter()
            .map(|r| {
                format!(
                    "--- {} ---\n{}",
                    r.chunk().location(),
                    r.chunk().content()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let cfg = config::current();
        let prompt_set = cfg.prompts.for_provider(self.llm.name());
        let prompt = prompts::research_synthesis(prompt_set)
            .replace("{question}", question)
            .replace("{evidence}", &evidence);

        let answer = self
            .llm
            .generate(
                &LlmRequest::new(prompt)
                    .with_system(prompts::wiki_system(prompt_set).to_string())
                    .with_max_tokens(cfg.deep_research.synthesis_max_tokens)
                    .with_temperature(cfg.deep_research.synthesis_temperature),
            )
            .await?;

        Ok(AskAnswer { answer, sources })
    }
}
