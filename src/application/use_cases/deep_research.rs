use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{prompts, EmbeddingService, LlmClient, LlmRequest, VectorStore};
use crate::config::{self, DeepResearchConfig};
use crate::domain::{
    Chunk, DeepResearchResult, DomainError, ProgressEvent, QuestionCategory, ResearchProgress,
    ResearchStep, SearchQuery, SourceReference, StepKind, SubQuestion,
};

const TOTAL_STEPS: u32 = 5;

/// Polled between steps and before every LLM call; returning true aborts the
/// pipeline cooperatively.
pub type CancellationPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Default, Clone)]
pub struct ResearchOptions {
    pub config: Option<DeepResearchConfig>,
    pub progress: Option<mpsc::Sender<ResearchProgress>>,
    pub cancel_predicate: Option<CancellationPredicate>,
    pub cancel: CancellationToken,
}

/// Multi-step research: decomposition → parallel retrieval → gap analysis →
/// follow-up retrieval → synthesis. Owns no durable state.
pub struct DeepResearchUseCase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    llm: Arc<dyn LlmClient>,
}

/// Internal working set: chunks keyed by id with their best score so far.
struct Evidence {
    chunks: Vec<(Chunk, f32)>,
    by_id: HashMap<String, usize>,
}

impl Evidence {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn merge(&mut self, chunk: Chunk, score: f32) {
        match self.by_id.get(chunk.id()) {
            Some(&idx) => {
                if score > self.chunks[idx].1 {
                    self.chunks[idx].1 = score;
                }
            }
            None => {
                self.by_id.insert(chunk.id().to_string(), self.chunks.len());
                self.chunks.push((chunk, score));
            }
        }
    }

    /// Keep the top `cap` chunks by descending score.
    fn truncate(&mut self, cap: usize) {
        self.chunks.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        self.chunks.truncate(cap);
        self.by_id = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, (c, _))| (c.id().to_string(), i))
            .collect();
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

impl DeepResearchUseCase {
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
        options: ResearchOptions,
    ) -> Result<DeepResearchResult, DomainError> {
        if question.trim().is_empty() {
            return Err(DomainError::invalid_input("Question must not be empty"));
        }
        if self.store.count().await? == 0 {
            return Err(DomainError::not_indexed(
                "the vector store contains no chunks",
            ));
        }

        let research_config = options
            .config
            .unwrap_or_else(|| config::current().deep_research);
        let mut run = Run {
            question: question.to_string(),
            options,
            config: research_config,
            steps: Vec::new(),
            llm_calls: 0,
        };

        run.emit(0, ProgressEvent::Started, "Research started", None).await;

        // Step 1: decomposition.
        run.check_cancelled("decomposition").await?;
        let step_start = Instant::now();
        let sub_questions = self.decompose(&mut run).await?;
        run.record(StepKind::Decomposition, "Question decomposition", step_start);
        run.emit(
            1,
            ProgressEvent::DecompositionComplete,
            format!("Decomposed into {} sub-questions", sub_questions.len()),
            Some(serde_json::json!({
                "sub_questions": sub_questions.iter().map(|q| q.text.clone()).collect::<Vec<_>>(),
            })),
        )
        .await;

        // Step 2: parallel retrieval.
        run.check_cancelled("retrieval").await?;
        let step_start = Instant::now();
        let mut evidence = Evidence::new();
        self.retrieve(&sub_questions, &mut evidence, run.config.chunks_per_subquestion)
            .await;
        evidence.truncate(run.config.max_total_chunks);
        run.record(StepKind::Retrieval, "Parallel sub-question retrieval", step_start);
        run.emit(
            2,
            ProgressEvent::RetrievalComplete,
            format!("Retrieved {} chunks", evidence.len()),
            Some(serde_json::json!({ "chunks_retrieved": evidence.len() })),
        )
        .await;

        // Step 3: gap analysis.
        run.check_cancelled("gap_analysis").await?;
        let step_start = Instant::now();
        let follow_ups = self.analyze_gaps(&mut run, &sub_questions, &evidence).await?;
        run.record(StepKind::GapAnalysis, "Evidence gap analysis", step_start);
        run.emit(
            3,
            ProgressEvent::GapAnalysisComplete,
            format!("Identified {} follow-up queries", follow_ups.len()),
            Some(serde_json::json!({ "follow_up_queries": follow_ups })),
        )
        .await;

        // Step 4: follow-up retrieval, still bounded by the global cap.
        run.check_cancelled("follow_up").await?;
        let step_start = Instant::now();
        let follow_up_questions: Vec<SubQuestion> = follow_ups
            .iter()
            .map(|q| SubQuestion::new(q.clone(), QuestionCategory::Structure))
            .collect();
        self.retrieve(
            &follow_up_questions,
            &mut evidence,
            run.config.chunks_per_subquestion,
        )
        .await;
        evidence.truncate(run.config.max_total_chunks);
        run.record(StepKind::Retrieval, "Follow-up retrieval", step_start);
        run.emit(
            4,
            ProgressEvent::FollowupComplete,
            format!("Working set holds {} chunks", evidence.len()),
            Some(serde_json::json!({ "chunks_retrieved": evidence.len() })),
        )
        .await;

        // Step 5: synthesis.
        run.check_cancelled("synthesis").await?;
        run.emit(5, ProgressEvent::SynthesisStarted, "Synthesizing answer", None)
            .await;
        let step_start = Instant::now();
        let answer = self.synthesize(&mut run, &evidence).await?;
        run.record(StepKind::Synthesis, "Answer synthesis", step_start);

        let sources: Vec<SourceReference> = evidence
            .chunks
            .iter()
            .map(|(chunk, score)| SourceReference::from_chunk(chunk, *score))
            .collect();

        let chunks_analyzed = evidence.len() as u64;
        let duration: f64 = run.steps.iter().map(|s| s.duration.as_secs_f64()).sum();
        run.emit(
            5,
            ProgressEvent::Complete,
            "Research complete",
            Some(serde_json::json!({ "duration_seconds": duration })),
        )
        .await;

        info!(
            "Deep research finished: {} chunks analyzed, {} LLM calls",
            chunks_analyzed, run.llm_calls
        );

        Ok(DeepResearchResult {
            question: question.to_string(),
            answer,
            sub_questions,
            sources,
            steps: run.steps,
            chunks_analyzed,
            llm_calls: run.llm_calls,
        })
    }

    async fn decompose(&self, run: &mut Run) -> Result<Vec<SubQuestion>, DomainError> {
        let cfg = config::current();
        let prompt_set = cfg.prompts.for_provider(self.llm.name());
        let template = prompts::research_decomposition(prompt_set);
        let prompt = template
            .replace("{max_sub_questions}", &run.config.max_sub_questions.to_string())
            .replace("{question}", &run.question);

        let request = LlmRequest::new(prompt).with_max_tokens(1024).with_temperature(0.0);

        // One re-prompt on a malformed response before falling back to the
        // original question as the single sub-question.
        for attempt in 0..2 {
            run.check_cancelled("decomposition").await?;
            let response = self.llm.generate(&request).await?;
            run.llm_calls += 1;

            let parsed = parse_sub_questions(&response, run.config.max_sub_questions);
            if !parsed.is_empty() {
                return Ok(parsed);
            }
            warn!(
                "Decomposition response unparseable (attempt {}): {}",
                attempt + 1,
                response
            );
        }

        Ok(vec![SubQuestion::new(
            run.question.clone(),
            QuestionCategory::Structure,
        )])
    }

    /// Search all questions concurrently and merge hits into the evidence
    /// set. Individual search failures are logged and skipped.
    async fn retrieve(&self, questions: &[SubQuestion], evidence: &mut Evidence, limit: usize) {
        let searches = questions.iter().map(|q| {
            let store = Arc::clone(&self.store);
            let embedder = Arc::clone(&self.embedder);
            let text = q.text.clone();
            async move {
                let vector = embedder.embed_query(&text).await?;
                store
                    .search(&vector, &SearchQuery::new(&text).with_limit(limit))
                    .await
            }
        });

        for (question, outcome) in questions.iter().zip(join_all(searches).await) {
            match outcome {
                Ok(results) => {
                    debug!("Sub-question '{}' retrieved {} chunks", question.text, results.len());
                    for result in results {
                        let score = result.score();
                        evidence.merge(result.into_chunk(), score);
                    }
                }
                Err(e) => warn!("Retrieval for '{}' failed: {}", question.text, e),
            }
        }
    }

    async fn analyze_gaps(
        &self,
        run: &mut Run,
        sub_questions: &[SubQuestion],
        evidence: &Evidence,
    ) -> Result<Vec<String>, DomainError> {
        if run.config.max_follow_up_queries == 0 {
            return Ok(Vec::new());
        }

        let cfg = config::current();
        let prompt_set = cfg.prompts.for_provider(self.llm.name());
        let sub_question_list = sub_questions
            .iter()
            .map(|q| format!("- [{}] {}", q.category.as_str(), q.text))
            .collect::<Vec<_>>()
            .join("\n");
        let summaries = evidence
            .chunks
            .iter()
            .map(|(chunk, _)| {
                format!(
                    "- {} ({} {})",
                    chunk.location(),
                    chunk.kind(),
                    chunk.name().unwrap_or("unnamed"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = prompts::research_gap_analysis(prompt_set)
            .replace("{question}", &run.question)
            .replace("{sub_questions}", &sub_question_list)
            .replace("{evidence}", &summaries)
            .replace("{max_follow_ups}", &run.config.max_follow_up_queries.to_string());

        run.check_cancelled("gap_analysis").await?;
        let response = self
            .llm
            .generate(&LlmRequest::new(prompt).with_max_tokens(512).with_temperature(0.0))
            .await?;
        run.llm_calls += 1;

        Ok(parse_string_array(&response)
            .into_iter()
            .take(run.config.max_follow_up_queries)
            .collect())
    }

    async fn synthesize(&self, run: &mut Run, evidence: &Evidence) -> Result<String, DomainError> {
        let cfg = config::current();
        let prompt_set = cfg.prompts.for_provider(self.llm.name());

        let evidence_text = evidence
            .chunks
            .iter()
            .map(|(chunk, _)| format!("--- {} ---\n{}", chunk.location(), chunk.content()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = prompts::research_synthesis(prompt_set)
            .replace("{question}", &run.question)
            .replace("{evidence}", &evidence_text);

        run.check_cancelled("synthesis").await?;
        let answer = self
            .llm
            .generate(
                &LlmRequest::new(prompt)
                    .with_system(prompts::wiki_system(prompt_set).to_string())
                    .with_max_tokens(run.config.synthesis_max_tokens)
                    .with_temperature(run.config.synthesis_temperature),
            )
            .await?;
        run.llm_calls += 1;
        Ok(answer)
    }
}

/// Mutable state threaded through one pipeline execution.
struct Run {
    question: String,
    options: ResearchOptions,
    config: DeepResearchConfig,
    steps: Vec<ResearchStep>,
    llm_calls: u64,
}

impl Run {
    async fn emit(
        &self,
        step: u32,
        event: ProgressEvent,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) {
        let Some(sender) = &self.options.progress else {
            return;
        };
        let mut progress = ResearchProgress::new(step, TOTAL_STEPS, event, message);
        if let Some(payload) = payload {
            progress = progress.with_payload(payload);
        }
        // A dropped receiver must not abort research.
        let _ = sender.send(progress).await;
    }

    /// Cooperative cancellation point. Emits the final `cancelled` event and
    /// raises with the step that was about to run.
    async fn check_cancelled(&self, step: &str) -> Result<(), DomainError> {
        let cancelled = self.options.cancel.is_cancelled()
            || self
                .options
                .cancel_predicate
                .as_ref()
                .is_some_and(|p| p());
        if !cancelled {
            return Ok(());
        }

        self.emit(
            self.steps.len() as u32,
            ProgressEvent::Cancelled,
            format!("Research cancelled during {}", step),
            Some(serde_json::json!({ "step": step })),
        )
        .await;
        Err(DomainError::research_cancelled(step))
    }

    fn record(&mut self, kind: StepKind, description: &str, started: Instant) {
        self.steps.push(ResearchStep {
            kind,
            description: description.to_string(),
            duration: started.elapsed(),
        });
    }
}

/// Parse the decomposition response: a JSON array of `{text, category}`
/// objects, tolerating surrounding prose and a plain string-array shape.
fn parse_sub_questions(response: &str, cap: usize) -> Vec<SubQuestion> {
    let Some(raw) = extract_json_array(response) else {
        return Vec::new();
    };

    #[derive(serde::Deserialize)]
    struct Item {
        text: String,
        #[serde(default)]
        category: Option<String>,
    }

    if let Ok(items) = serde_json::from_str::<Vec<Item>>(raw) {
        return items
            .into_iter()
            .filter(|i| !i.text.trim().is_empty())
            .take(cap)
            .map(|i| {
                SubQuestion::new(
                    i.text.trim().to_string(),
                    QuestionCategory::parse(i.category.as_deref().unwrap_or("structure")),
                )
            })
            .collect();
    }

    parse_string_array(response)
        .into_iter()
        .take(cap)
        .map(|text| SubQuestion::new(text, QuestionCategory::Structure))
        .collect()
}

fn parse_string_array(response: &str) -> Vec<String> {
    let Some(raw) = extract_json_array(response) else {
        return Vec::new();
    };
    serde_json::from_str::<Vec<String>>(raw)
        .map(|items| {
            items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// The first `[...]` span in the text, ignoring surrounding prose.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
