use async_trait::async_trait;

use crate::domain::{Chunk, DomainError, Language};

/// Parses source files into semantic chunks.
///
/// Implementations parse on a worker thread (parsing is CPU-bound) and apply
/// the chunking rules: one module chunk per file, one aggregated imports
/// chunk, class chunks (split into summary + methods above the configured
/// line threshold), and top-level function chunks.
#[async_trait]
pub trait ParserService: Send + Sync {
    /// Chunk a file's raw bytes. Display fields are lossy-decoded; the bytes
    /// themselves are the provenance for hashing.
    async fn chunk_file(
        &self,
        bytes: &[u8],
        file_path: &str,
        language: Language,
    ) -> Result<Vec<Chunk>, DomainError>;

    fn supported_languages(&self) -> Vec<Language>;

    fn supports_language(&self, language: Language) -> bool {
        self.supported_languages().contains(&language)
    }
}
