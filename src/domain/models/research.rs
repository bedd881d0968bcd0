use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Chunk, ChunkKind};

/// Coarse classification of a decomposed sub-question, used to steer retrieval
/// phrasing and reported back in the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Structure,
    Flow,
    Dependencies,
    Impact,
    Comparison,
}

impl QuestionCategory {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "flow" => QuestionCategory::Flow,
            "dependencies" => QuestionCategory::Dependencies,
            "impact" => QuestionCategory::Impact,
            "comparison" => QuestionCategory::Comparison,
            _ => QuestionCategory::Structure,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Structure => "structure",
            QuestionCategory::Flow => "flow",
            QuestionCategory::Dependencies => "dependencies",
            QuestionCategory::Impact => "impact",
            QuestionCategory::Comparison => "comparison",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestion {
    pub text: String,
    pub category: QuestionCategory,
}

impl SubQuestion {
    pub fn new(text: impl Into<String>, category: QuestionCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }
}

/// Chunk provenance distilled for answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub score: f32,
}

impl SourceReference {
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            file_path: chunk.file_path().to_string(),
            start_line: chunk.start_line(),
            end_line: chunk.end_line(),
            kind: chunk.kind(),
            name: chunk.name().map(String::from),
            score,
        }
    }

    pub fn citation(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Decomposition,
    Retrieval,
    GapAnalysis,
    Synthesis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchStep {
    pub kind: StepKind,
    pub description: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepResearchResult {
    pub question: String,
    pub answer: String,
    pub sub_questions: Vec<SubQuestion>,
    pub sources: Vec<SourceReference>,
    pub steps: Vec<ResearchStep>,
    pub chunks_analyzed: u64,
    pub llm_calls: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEvent {
    Started,
    DecompositionComplete,
    RetrievalComplete,
    GapAnalysisComplete,
    FollowupComplete,
    SynthesisStarted,
    Complete,
    Cancelled,
}

/// One progress notification pushed to the caller's channel per pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProgress {
    pub step: u32,
    pub total_steps: u32,
    pub event: ProgressEvent,
    pub message: String,
    pub payload: Option<serde_json::Value>,
}

impl ResearchProgress {
    pub fn new(step: u32, total_steps: u32, event: ProgressEvent, message: impl Into<String>) -> Self {
        Self {
            step,
            total_steps,
            event,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;

    #[test]
    fn test_category_parse_defaults_to_structure() {
        assert_eq!(QuestionCategory::parse("flow"), QuestionCategory::Flow);
        assert_eq!(QuestionCategory::parse("IMPACT"), QuestionCategory::Impact);
        assert_eq!(QuestionCategory::parse("whatever"), QuestionCategory::Structure);
    }

    #[test]
    fn test_source_reference_citation_format() {
        let chunk = Chunk::new(
            "src/indexer.rs",
            Language::Rust,
            ChunkKind::Function,
            "fn run() {}",
            40,
            55,
        )
        .with_name("run");
        let source = SourceReference::from_chunk(&chunk, 0.9);
        assert_eq!(source.citation(), "src/indexer.rs:40-55");
        assert_eq!(source.name.as_deref(), Some("run"));
    }

    #[test]
    fn test_progress_payload_roundtrip() {
        let progress = ResearchProgress::new(1, 5, ProgressEvent::DecompositionComplete, "done")
            .with_payload(serde_json::json!({"sub_questions": 3}));
        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("decomposition_complete"));
        assert!(json.contains("sub_questions"));
    }
}
