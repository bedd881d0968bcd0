//! Pure chunk emission over an already-parsed tree. Deterministic given the
//! file bytes: re-chunking an unchanged file yields identical ids.

use std::collections::HashSet;

use tree_sitter::{Node, Tree};

use crate::connector::adapter::treesitter_parser as syntax;
use crate::domain::{Chunk, ChunkKind, Language};

const MAX_MODULE_IMPORTS: usize = 10;

/// Emit the chunk sequence for one file: module overview, aggregated imports,
/// classes (split into summary + methods past `class_split_threshold` raw
/// lines), and top-level functions.
pub fn chunk_tree(
    tree: &Tree,
    source: &str,
    file_path: &str,
    language: Language,
    class_split_threshold: u32,
) -> Vec<Chunk> {
    let root = tree.root_node();
    let line_count = source.lines().count().max(1) as u32;

    let import_nodes = import_nodes(root, source, language);
    let class_nodes = syntax::find_nodes(root, syntax::class_node_kinds(language));
    let function_nodes: Vec<Node> = syntax::find_nodes(root, syntax::function_node_kinds(language))
        .into_iter()
        .filter(|n| syntax::enclosing_class_id(*n, language).is_none())
        .collect();

    let mut chunks = Vec::new();
    chunks.push(module_chunk(
        source,
        file_path,
        language,
        line_count,
        &import_nodes,
        &class_nodes,
        &function_nodes,
    ));

    if let Some(imports) = imports_chunk(source, file_path, language, &import_nodes) {
        chunks.push(imports);
    }

    for class_node in &class_nodes {
        emit_class(
            *class_node,
            source,
            file_path,
            language,
            class_split_threshold,
            &mut chunks,
        );
    }

    for function_node in &function_nodes {
        // Forward declarations and stubs carry no useful content.
        if syntax::node_text(*function_node, source).trim().len() < 10 {
            continue;
        }
        chunks.push(function_chunk(*function_node, source, file_path, language));
    }

    dedup_by_id(chunks)
}

fn import_nodes<'a>(root: Node<'a>, source: &str, language: Language) -> Vec<Node<'a>> {
    let nodes = syntax::find_nodes(root, syntax::import_node_kinds(language));
    if language == Language::Ruby {
        // Ruby has no dedicated import node; keep only require-style calls.
        nodes
            .into_iter()
            .filter(|n| {
                let text = syntax::node_text(*n, source);
                text.starts_with("require") || text.starts_with("load ")
            })
            .collect()
    } else {
        nodes
    }
}

/// Whole-file overview chunk with a synthetic summary: up to ten import
/// strings plus the comma-joined class and top-level function names.
fn module_chunk(
    source: &str,
    file_path: &str,
    language: Language,
    line_count: u32,
    import_nodes: &[Node],
    class_nodes: &[Node],
    function_nodes: &[Node],
) -> Chunk {
    let imports: Vec<String> = import_nodes
        .iter()
        .take(MAX_MODULE_IMPORTS)
        .map(|n| first_line(&syntax::node_text(*n, source)))
        .collect();
    let class_names = joined_names(class_nodes, source, language);
    let function_names = joined_names(function_nodes, source, language);

    let mut summary = format!("Module: {}\nLanguage: {}\n", file_path, language);
    if !imports.is_empty() {
        summary.push_str(&format!("Imports ({}):\n", import_nodes.len()));
        for import in &imports {
            summary.push_str("  ");
            summary.push_str(import);
            summary.push('\n');
        }
    }
    if !class_names.is_empty() {
        summary.push_str(&format!("Classes: {}\n", class_names));
    }
    if !function_names.is_empty() {
        summary.push_str(&format!("Functions: {}\n", function_names));
    }

    let stem = std::path::Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_path)
        .to_string();

    Chunk::new(file_path, language, ChunkKind::Module, summary, 1, line_count)
        .with_name(stem)
        .with_metadata("class_count", class_nodes.len().into())
        .with_metadata("function_count", function_nodes.len().into())
}

fn imports_chunk(
    source: &str,
    file_path: &str,
    language: Language,
    import_nodes: &[Node],
) -> Option<Chunk> {
    if import_nodes.is_empty() {
        return None;
    }
    let start = import_nodes
        .iter()
        .map(|n| n.start_position().row as u32 + 1)
        .min()?;
    let end = import_nodes
        .iter()
        .map(|n| n.end_position().row as u32 + 1)
        .max()?;
    let content = import_nodes
        .iter()
        .map(|n| syntax::node_text(*n, source))
        .collect::<Vec<_>>()
        .join("\n");

    Some(
        Chunk::new(file_path, language, ChunkKind::Import, content, start, end)
            .with_name("imports")
            .with_metadata("import_count", import_nodes.len().into()),
    )
}

fn emit_class(
    class_node: Node,
    source: &str,
    file_path: &str,
    language: Language,
    class_split_threshold: u32,
    out: &mut Vec<Chunk>,
) {
    // C/C++ `struct foo` also appears as a bare type reference; only a
    // definition with a body is a chunk.
    if matches!(language, Language::C | Language::Cpp)
        && class_node.child_by_field_name("body").is_none()
    {
        return;
    }

    let name = syntax::node_name(class_node, source, language)
        .unwrap_or_else(|| "anonymous".to_string());
    let start = class_node.start_position().row as u32 + 1;
    let end = class_node.end_position().row as u32 + 1;
    let parents = syntax::parent_class_names(class_node, source, language);
    let docstring = syntax::docstring_for(class_node, source, language);

    // Raw line span, blanks and comments included.
    let span = end - start + 1;

    if span > class_split_threshold {
        let methods: Vec<Node> = syntax::find_nodes(class_node, syntax::method_node_kinds(language))
            .into_iter()
            .filter(|m| syntax::enclosing_class_id(*m, language) == Some(class_node.id()))
            .collect();
        let method_names: Vec<String> = methods
            .iter()
            .filter_map(|m| syntax::node_name(*m, source, language))
            .collect();

        let signature = first_line(&syntax::node_text(class_node, source));
        let summary = format!("{}\n# Methods: {}", signature, method_names.join(", "));

        let mut chunk = Chunk::new(file_path, language, ChunkKind::Class, summary, start, end)
            .with_name(name.clone())
            .with_metadata("is_summary", true.into())
            .with_metadata("method_count", methods.len().into());
        if !parents.is_empty() {
            chunk = chunk.with_metadata("parent_classes", parents.clone().into());
        }
        if let Some(doc) = docstring {
            chunk = chunk.with_docstring(doc);
        }
        out.push(chunk);

        for method in methods {
            let Some(method_name) = syntax::node_name(method, source, language) else {
                continue;
            };
            let method_start = method.start_position().row as u32 + 1;
            let method_end = method.end_position().row as u32 + 1;
            let mut chunk = Chunk::new(
                file_path,
                language,
                ChunkKind::Method,
                syntax::node_text(method, source),
                method_start,
                method_end,
            )
            .with_name(method_name)
            .with_parent_name(name.clone());
            if let Some(doc) = syntax::docstring_for(method, source, language) {
                chunk = chunk.with_docstring(doc);
            }
            out.push(chunk);
        }
    } else {
        let mut chunk = Chunk::new(
            file_path,
            language,
            ChunkKind::Class,
            syntax::node_text(class_node, source),
            start,
            end,
        )
        .with_name(name);
        if !parents.is_empty() {
            chunk = chunk.with_metadata("parent_classes", parents.into());
        }
        if let Some(doc) = docstring {
            chunk = chunk.with_docstring(doc);
        }
        out.push(chunk);
    }
}

fn function_chunk(node: Node, source: &str, file_path: &str, language: Language) -> Chunk {
    let start = node.start_position().row as u32 + 1;
    let end = node.end_position().row as u32 + 1;
    let mut chunk = Chunk::new(
        file_path,
        language,
        ChunkKind::Function,
        syntax::node_text(node, source),
        start,
        end,
    );
    if let Some(name) = syntax::node_name(node, source, language) {
        chunk = chunk.with_name(name);
    }
    if let Some(doc) = syntax::docstring_for(node, source, language) {
        chunk = chunk.with_docstring(doc);
    }
    chunk
}

fn joined_names(nodes: &[Node], source: &str, language: Language) -> String {
    nodes
        .iter()
        .filter_map(|n| syntax::node_name(*n, source, language))
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim_end().to_string()
}

fn dedup_by_id(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|c| seen.insert(c.id().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::adapter::treesitter_parser::grammar_for;
    use tree_sitter::Parser;

    fn chunk(source: &str, path: &str, language: Language, threshold: u32) -> Vec<Chunk> {
        let mut parser = Parser::new();
        parser.set_language(&grammar_for(language).unwrap()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        chunk_tree(&tree, source, path, language, threshold)
    }

    const SAMPLE_PY: &str = r#"import os
from collections import OrderedDict


class Cache:
    """A tiny cache."""

    def get(self, key):
        return self._data.get(key)

    def put(self, key, value):
        self._data[key] = value


def make_cache():
    """Build a cache."""
    return Cache()
"#;

    #[test]
    fn test_python_file_chunk_inventory() {
        let chunks = chunk(SAMPLE_PY, "a.py", Language::Python, 100);

        let count = |kind: ChunkKind| chunks.iter().filter(|c| c.kind() == kind).count();
        assert_eq!(count(ChunkKind::Module), 1);
        assert_eq!(count(ChunkKind::Import), 1);
        assert_eq!(count(ChunkKind::Class), 1);
        assert_eq!(count(ChunkKind::Method), 0, "small class stays whole");
        assert_eq!(count(ChunkKind::Function), 1);

        let class_chunk = chunks.iter().find(|c| c.kind() == ChunkKind::Class).unwrap();
        assert_eq!(class_chunk.name(), Some("Cache"));
        assert_eq!(class_chunk.docstring(), Some("A tiny cache."));

        let function = chunks.iter().find(|c| c.kind() == ChunkKind::Function).unwrap();
        assert_eq!(function.name(), Some("make_cache"));
        assert_eq!(function.docstring(), Some("Build a cache."));
    }

    #[test]
    fn test_module_chunk_summary_lists_declarations() {
        let chunks = chunk(SAMPLE_PY, "a.py", Language::Python, 100);
        let module = chunks.iter().find(|c| c.kind() == ChunkKind::Module).unwrap();
        assert_eq!(module.start_line(), 1);
        assert!(module.content().contains("import os"));
        assert!(module.content().contains("Classes: Cache"));
        assert!(module.content().contains("Functions: make_cache"));
    }

    #[test]
    fn test_imports_chunk_metadata() {
        let chunks = chunk(SAMPLE_PY, "a.py", Language::Python, 100);
        let imports = chunks.iter().find(|c| c.kind() == ChunkKind::Import).unwrap();
        assert_eq!(imports.metadata().get("import_count"), Some(&2.into()));
        assert!(imports.content().contains("from collections import OrderedDict"));
        assert_eq!(imports.start_line(), 1);
        assert_eq!(imports.end_line(), 2);
    }

    #[test]
    fn test_large_class_splits_into_summary_and_methods() {
        // Five methods padded past the split threshold.
        let mut source = String::from("class Big:\n");
        for i in 0..5 {
            source.push_str(&format!("    def method_{}(self):\n", i));
            for _ in 0..25 {
                source.push_str("        pass\n");
            }
            source.push('\n');
        }

        let chunks = chunk(&source, "big.py", Language::Python, 100);

        let class_chunks: Vec<_> = chunks.iter().filter(|c| c.kind() == ChunkKind::Class).collect();
        assert_eq!(class_chunks.len(), 1);
        let summary = class_chunks[0];
        assert!(summary.is_summary());
        assert!(summary.content().starts_with("class Big:"));
        assert!(summary.content().contains("# Methods: method_0, method_1"));
        assert_eq!(summary.metadata().get("method_count"), Some(&5.into()));

        let methods: Vec<_> = chunks.iter().filter(|c| c.kind() == ChunkKind::Method).collect();
        assert_eq!(methods.len(), 5);
        for method in methods {
            assert_eq!(method.parent_name(), Some("Big"));
        }
    }

    #[test]
    fn test_go_function_doc_comment_lands_in_docstring() {
        let source = r#"package main

import "fmt"

// Shout prints a message loudly.
func Shout(msg string) {
	fmt.Println(msg)
}
"#;
        let chunks = chunk(source, "b.go", Language::Go, 100);
        let count = |kind: ChunkKind| chunks.iter().filter(|c| c.kind() == kind).count();
        assert_eq!(count(ChunkKind::Module), 1);
        assert_eq!(count(ChunkKind::Import), 1);
        assert_eq!(count(ChunkKind::Function), 1);

        let function = chunks.iter().find(|c| c.kind() == ChunkKind::Function).unwrap();
        assert_eq!(function.name(), Some("Shout"));
        assert_eq!(function.docstring(), Some("Shout prints a message loudly."));
    }

    #[test]
    fn test_methods_are_not_duplicated_as_functions() {
        let chunks = chunk(SAMPLE_PY, "a.py", Language::Python, 100);
        let function_names: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind() == ChunkKind::Function)
            .filter_map(|c| c.name())
            .collect();
        assert!(!function_names.contains(&"get"));
        assert!(!function_names.contains(&"put"));
    }

    #[test]
    fn test_rechunking_yields_identical_ids() {
        let first: Vec<String> = chunk(SAMPLE_PY, "a.py", Language::Python, 100)
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        let second: Vec<String> = chunk(SAMPLE_PY, "a.py", Language::Python, 100)
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_line_bounds_within_file() {
        let chunks = chunk(SAMPLE_PY, "a.py", Language::Python, 100);
        let line_count = SAMPLE_PY.lines().count() as u32;
        for chunk in &chunks {
            assert!(chunk.start_line() >= 1);
            assert!(chunk.start_line() <= chunk.end_line());
            assert!(chunk.end_line() <= line_count);
        }
    }

    #[test]
    fn test_rust_impl_methods_attach_to_type() {
        let source = r#"
pub struct Counter {
    value: u64,
}

impl Counter {
    pub fn increment(&mut self) {
        self.value += 1;
    }
}

pub fn standalone() -> u64 {
    0
}
"#;
        let chunks = chunk(source, "counter.rs", Language::Rust, 100);
        let functions: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind() == ChunkKind::Function)
            .filter_map(|c| c.name())
            .collect();
        assert_eq!(functions, vec!["standalone"]);

        let classes: Vec<_> = chunks
            .iter()
            .filter(|c| c.kind() == ChunkKind::Class)
            .filter_map(|c| c.name())
            .collect();
        assert!(classes.contains(&"Counter"));
    }
}
