use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Repository is not indexed: {0}. Run `deepwiki index <path>` first.")]
    NotIndexed(String),

    #[error("Source read error: {0}")]
    SourceRead(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Research cancelled during {step}")]
    ResearchCancelled { step: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_indexed(msg: impl Into<String>) -> Self {
        Self::NotIndexed(msg.into())
    }

    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceRead(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn research_cancelled(step: impl Into<String>) -> Self {
        Self::ResearchCancelled { step: step.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// True for both cancellation variants. Cancellation must propagate
    /// unchanged through retry and logging layers.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ResearchCancelled { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    pub fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
