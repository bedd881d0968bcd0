use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A rendered wiki page, addressed by its path relative to the wiki root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPage {
    pub path: String,
    pub title: String,
    pub content: String,
    pub generated_at_epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub end_line: u32,
}

/// Per-page generation record: which sources contributed, at which hashes,
/// and the hash of the rendered content. Drives incremental regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WikiPageStatus {
    pub page_path: String,
    pub sources: Vec<String>,
    pub source_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub source_spans: BTreeMap<String, SourceSpan>,
    pub content_hash: String,
    pub generated_at_epoch: u64,
}

impl WikiPageStatus {
    pub fn new(
        page_path: impl Into<String>,
        source_hashes: BTreeMap<String, String>,
        content_hash: String,
        generated_at_epoch: u64,
    ) -> Self {
        let mut sources: Vec<String> = source_hashes.keys().cloned().collect();
        sources.sort();
        Self {
            page_path: page_path.into(),
            sources,
            source_hashes,
            source_spans: BTreeMap::new(),
            content_hash,
            generated_at_epoch,
        }
    }

    pub fn with_spans(mut self, spans: BTreeMap<String, SourceSpan>) -> Self {
        self.source_spans = spans;
        self
    }

    /// A page must be regenerated iff a contributing source's hash changed,
    /// the source set changed, or the rendered page file is missing.
    pub fn needs_regeneration(
        &self,
        current_hashes: &BTreeMap<String, String>,
        page_exists: bool,
    ) -> bool {
        if !page_exists {
            return true;
        }
        if self.source_hashes.len() != current_hashes.len() {
            return true;
        }
        for (path, hash) in current_hashes {
            match self.source_hashes.get(path) {
                Some(prior) if prior == hash => {}
                _ => return true,
            }
        }
        false
    }
}

/// Aggregate persisted to `wiki_status.json` beside the generated pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WikiGenerationStatus {
    pub index_status_hash: String,
    pub pages: BTreeMap<String, WikiPageStatus>,
    pub generated_at_epoch: u64,
}

impl WikiGenerationStatus {
    pub fn page(&self, path: &str) -> Option<&WikiPageStatus> {
        self.pages.get(path)
    }

    pub fn record(&mut self, status: WikiPageStatus) {
        self.pages.insert(status.page_path.clone(), status);
    }
}

/// Hash of a rendered page body, stored in the page status so unchanged
/// regenerations can be detected by callers and tests.
pub fn page_content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unchanged_sources_reuse_page() {
        let status = WikiPageStatus::new(
            "architecture.md",
            hashes(&[("src/a.rs", "h1"), ("src/b.rs", "h2")]),
            "content".to_string(),
            0,
        );
        assert!(!status.needs_regeneration(&hashes(&[("src/a.rs", "h1"), ("src/b.rs", "h2")]), true));
    }

    #[test]
    fn test_changed_hash_triggers_regeneration() {
        let status = WikiPageStatus::new(
            "architecture.md",
            hashes(&[("src/a.rs", "h1")]),
            "content".to_string(),
            0,
        );
        assert!(status.needs_regeneration(&hashes(&[("src/a.rs", "h9")]), true));
    }

    #[test]
    fn test_source_set_change_triggers_regeneration() {
        let status = WikiPageStatus::new(
            "dependencies.md",
            hashes(&[("src/a.rs", "h1")]),
            "content".to_string(),
            0,
        );
        // Added source.
        assert!(status.needs_regeneration(&hashes(&[("src/a.rs", "h1"), ("src/b.rs", "h2")]), true));
        // Removed source.
        assert!(status.needs_regeneration(&hashes(&[]), true));
    }

    #[test]
    fn test_missing_page_file_triggers_regeneration() {
        let status = WikiPageStatus::new(
            "index.md",
            hashes(&[("src/a.rs", "h1")]),
            "content".to_string(),
            0,
        );
        assert!(status.needs_regeneration(&hashes(&[("src/a.rs", "h1")]), false));
    }
}
