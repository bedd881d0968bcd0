use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Language;

/// One semantic unit extracted from a source file: a module overview, the
/// aggregated imports, a class (or class summary), a method, or a function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    id: String,
    file_path: String,
    language: Language,
    kind: ChunkKind,
    name: Option<String>,
    docstring: Option<String>,
    parent_name: Option<String>,
    content: String,
    start_line: u32,
    end_line: u32,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl Chunk {
    pub fn new(
        file_path: impl Into<String>,
        language: Language,
        kind: ChunkKind,
        content: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        let file_path = file_path.into();
        let id = chunk_id(&file_path, "", start_line);
        Self {
            id,
            file_path,
            language,
            kind,
            name: None,
            docstring: None,
            parent_name: None,
            content: content.into(),
            start_line,
            end_line,
            metadata: BTreeMap::new(),
        }
    }

    /// Reconstitutes from persisted data (used by store adapters).
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: String,
        file_path: String,
        language: Language,
        kind: ChunkKind,
        name: Option<String>,
        docstring: Option<String>,
        parent_name: Option<String>,
        content: String,
        start_line: u32,
        end_line: u32,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            file_path,
            language,
            kind,
            name,
            docstring,
            parent_name,
            content,
            start_line,
            end_line,
            metadata,
        }
    }

    /// Named chunks derive their id from the name; setting the name recomputes it.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.id = chunk_id(&self.file_path, &name, self.start_line);
        self.name = Some(name);
        self
    }

    pub fn with_docstring(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn with_parent_name(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn docstring(&self) -> Option<&str> {
        self.docstring.as_deref()
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.end_line
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    pub fn is_summary(&self) -> bool {
        self.metadata
            .get("is_summary")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn location(&self) -> String {
        format!("{}:{}-{}", self.file_path, self.start_line, self.end_line)
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    /// Text handed to the embedder: name, kind, docstring, then content.
    /// Keeping the composition in one place makes re-embedding reproducible.
    pub fn embedding_text(&self) -> String {
        let mut text = String::new();
        if let Some(name) = &self.name {
            text.push_str(name);
            text.push(' ');
        }
        text.push('[');
        text.push_str(self.kind.as_str());
        text.push_str("] ");
        if let Some(doc) = &self.docstring {
            text.push_str(doc);
            text.push(' ');
        }
        text.push_str(&self.content);
        text
    }

    pub fn qualified_name(&self) -> Option<String> {
        match (&self.parent_name, &self.name) {
            (Some(parent), Some(name)) => Some(format!("{}.{}", parent, name)),
            (None, Some(name)) => Some(name.clone()),
            _ => None,
        }
    }
}

/// Stable chunk identity: truncated SHA-256 of `file_path:name:start_line`.
/// 16 hex chars keeps ids short while staying collision-free within a run.
pub fn chunk_id(file_path: &str, name: &str, start_line: u32) -> String {
    let digest = Sha256::digest(format!("{}:{}:{}", file_path, name, start_line).as_bytes());
    let hex = format!("{:x}", digest);
    hex[..16].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Module,
    Import,
    Class,
    Method,
    Function,
    Comment,
    Other,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Module => "module",
            ChunkKind::Import => "import",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
            ChunkKind::Function => "function",
            ChunkKind::Comment => "comment",
            ChunkKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "module" => ChunkKind::Module,
            "import" => ChunkKind::Import,
            "class" => ChunkKind::Class,
            "method" => ChunkKind::Method,
            "function" => ChunkKind::Function,
            "comment" => ChunkKind::Comment,
            _ => ChunkKind::Other,
        }
    }

    /// Strict parse used for validating tool arguments; unknown names are
    /// rejected before any store filter is built from them.
    pub fn parse_strict(s: &str) -> Option<Self> {
        match s {
            "module" | "import" | "class" | "method" | "function" | "comment" | "other" => {
                Some(Self::parse(s))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_is_stable_and_short() {
        let a = chunk_id("src/a.py", "Foo", 10);
        let b = chunk_id("src/a.py", "Foo", 10);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_chunk_id_varies_by_component() {
        let base = chunk_id("src/a.py", "Foo", 10);
        assert_ne!(base, chunk_id("src/b.py", "Foo", 10));
        assert_ne!(base, chunk_id("src/a.py", "Bar", 10));
        assert_ne!(base, chunk_id("src/a.py", "Foo", 11));
    }

    #[test]
    fn test_with_name_recomputes_id() {
        let anon = Chunk::new("a.py", Language::Python, ChunkKind::Function, "def f(): ...", 3, 4);
        let named = anon.clone().with_name("f");
        assert_ne!(anon.id(), named.id());
        assert_eq!(named.id(), &chunk_id("a.py", "f", 3));
    }

    #[test]
    fn test_embedding_text_includes_name_kind_docstring() {
        let chunk = Chunk::new("a.py", Language::Python, ChunkKind::Function, "def f(): ...", 1, 2)
            .with_name("f")
            .with_docstring("Does the thing.");
        let text = chunk.embedding_text();
        assert!(text.starts_with("f [function] Does the thing."));
        assert!(text.ends_with("def f(): ..."));
    }

    #[test]
    fn test_qualified_name() {
        let method = Chunk::new("a.py", Language::Python, ChunkKind::Method, "def m(self): ...", 5, 6)
            .with_name("m")
            .with_parent_name("Widget");
        assert_eq!(method.qualified_name(), Some("Widget.m".to_string()));
    }

    #[test]
    fn test_chunk_kind_roundtrip() {
        for kind in ["module", "import", "class", "method", "function", "comment", "other"] {
            assert_eq!(ChunkKind::parse_strict(kind).unwrap().as_str(), kind);
        }
        assert_eq!(ChunkKind::parse_strict("struct"), None);
    }
}
