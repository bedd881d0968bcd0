use async_trait::async_trait;
use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::application::ParserService;
use crate::config;
use crate::connector::adapter::chunker;
use crate::domain::{Chunk, DomainError, Language};

/// Tree-sitter front-end for all supported grammars.
///
/// Parsing and chunking are CPU-bound, so `chunk_file` runs them on the
/// blocking thread pool. Everything below the trait impl is synchronous and
/// shared with the chunker: grammar selection, node-kind tables, name lookup,
/// and per-language docstring extraction.
pub struct TreeSitterParser {
    supported_languages: Vec<Language>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            supported_languages: Language::all_supported(),
        }
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParserService for TreeSitterParser {
    async fn chunk_file(
        &self,
        bytes: &[u8],
        file_path: &str,
        language: Language,
    ) -> Result<Vec<Chunk>, DomainError> {
        if grammar_for(language).is_none() {
            return Err(DomainError::parse(format!(
                "Unsupported language: {:?}",
                language
            )));
        }

        let source = String::from_utf8_lossy(bytes).into_owned();
        let path = file_path.to_string();
        let threshold = config::current().chunking.class_split_threshold;

        let chunks = tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>, DomainError> {
            let ts_language = grammar_for(language)
                .ok_or_else(|| DomainError::parse(format!("Unsupported language: {:?}", language)))?;

            let mut parser = Parser::new();
            parser
                .set_language(&ts_language)
                .map_err(|e| DomainError::parse(format!("Failed to set language: {}", e)))?;

            let tree = parser
                .parse(&source, None)
                .ok_or_else(|| DomainError::parse(format!("Failed to parse {}", path)))?;

            Ok(chunker::chunk_tree(&tree, &source, &path, language, threshold))
        })
        .await
        .map_err(|e| DomainError::internal(format!("Parser task failed: {}", e)))??;

        debug!(
            "Chunked {} into {} chunks ({:?})",
            file_path,
            chunks.len(),
            language
        );

        Ok(chunks)
    }

    fn supported_languages(&self) -> Vec<Language> {
        self.supported_languages.clone()
    }
}

pub(crate) fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
    match language {
        Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
        Language::C => Some(tree_sitter_c::LANGUAGE.into()),
        Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        Language::Swift => Some(tree_sitter_swift::LANGUAGE.into()),
        Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
        Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
        Language::Kotlin => Some(tree_sitter_kotlin_ng::LANGUAGE.into()),
        Language::CSharp => Some(tree_sitter_c_sharp::LANGUAGE.into()),
        Language::Unknown => None,
    }
}

/// Node kinds treated as class-like declarations. Methods are searched inside
/// these; functions nested (transitively) inside them are not re-emitted as
/// top-level function chunks.
pub(crate) fn class_node_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["class_definition"],
        Language::TypeScript | Language::Tsx => &["class_declaration", "interface_declaration"],
        Language::JavaScript => &["class_declaration"],
        Language::Go => &[],
        Language::Rust => &["struct_item", "enum_item", "trait_item", "impl_item"],
        Language::Java => &["class_declaration", "interface_declaration", "enum_declaration"],
        Language::C => &["struct_specifier"],
        Language::Cpp => &["class_specifier", "struct_specifier"],
        Language::Swift => &["class_declaration", "protocol_declaration"],
        Language::Ruby => &["class", "module"],
        Language::Php => &["class_declaration", "interface_declaration", "trait_declaration"],
        Language::Kotlin => &["class_declaration", "object_declaration"],
        Language::CSharp => &["class_declaration", "interface_declaration", "struct_declaration"],
        Language::Unknown => &[],
    }
}

/// Node kinds for standalone functions at any nesting level; the chunker
/// filters out those inside class nodes.
pub(crate) fn function_node_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["function_definition"],
        Language::TypeScript | Language::Tsx | Language::JavaScript => &["function_declaration"],
        Language::Go => &["function_declaration", "method_declaration"],
        Language::Rust => &["function_item"],
        Language::Java => &[],
        Language::C | Language::Cpp => &["function_definition"],
        Language::Swift => &["function_declaration"],
        Language::Ruby => &["method"],
        Language::Php => &["function_definition"],
        Language::Kotlin => &["function_declaration"],
        Language::CSharp => &[],
        Language::Unknown => &[],
    }
}

/// Node kinds for methods, searched inside a class node's subtree.
pub(crate) fn method_node_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["function_definition"],
        Language::TypeScript | Language::Tsx | Language::JavaScript => &["method_definition"],
        Language::Go => &[],
        Language::Rust => &["function_item"],
        Language::Java => &["method_declaration", "constructor_declaration"],
        Language::C => &[],
        Language::Cpp => &["function_definition"],
        Language::Swift => &["function_declaration"],
        Language::Ruby => &["method"],
        Language::Php => &["method_declaration"],
        Language::Kotlin => &["function_declaration"],
        Language::CSharp => &["method_declaration", "constructor_declaration"],
        Language::Unknown => &[],
    }
}

/// Node kinds aggregated into the imports chunk.
pub(crate) fn import_node_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["import_statement", "import_from_statement"],
        Language::TypeScript | Language::Tsx | Language::JavaScript => &["import_statement"],
        Language::Go => &["import_declaration"],
        Language::Rust => &["use_declaration"],
        Language::Java => &["import_declaration"],
        Language::C | Language::Cpp => &["preproc_include"],
        Language::Swift => &["import_declaration"],
        // Ruby has no import node kind; `require` calls are matched by text.
        Language::Ruby => &["call"],
        Language::Php => &["namespace_use_declaration"],
        Language::Kotlin => &["import_header"],
        Language::CSharp => &["using_directive"],
        Language::Unknown => &[],
    }
}

/// Node kinds carrying inheritance information, searched among a class
/// node's direct children.
pub(crate) fn heritage_node_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["argument_list"],
        Language::TypeScript | Language::Tsx | Language::JavaScript => &["class_heritage"],
        Language::Java => &["superclass", "super_interfaces"],
        Language::Rust => &["trait_bounds"],
        Language::Cpp => &["base_class_clause"],
        Language::Swift => &["inheritance_specifier"],
        Language::Ruby => &["superclass"],
        Language::Php => &["base_clause", "class_interface_clause"],
        Language::Kotlin => &["delegation_specifier"],
        Language::CSharp => &["base_list"],
        Language::Go | Language::C | Language::Unknown => &[],
    }
}

/// Collect every node in `root`'s subtree whose kind is in `kinds`, in
/// document order.
pub(crate) fn find_nodes<'a>(root: Node<'a>, kinds: &[&str]) -> Vec<Node<'a>> {
    let mut out = Vec::new();
    collect_nodes(root, kinds, &mut out);
    out
}

fn collect_nodes<'a>(node: Node<'a>, kinds: &[&str], out: &mut Vec<Node<'a>>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if kinds.contains(&child.kind()) {
            out.push(child);
        }
        collect_nodes(child, kinds, out);
    }
}

pub(crate) fn node_text(node: Node, source: &str) -> String {
    source
        .get(node.byte_range())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

/// Resolve a declaration's name via the grammar's name subfields, with
/// per-language fallbacks for grammars that bury the identifier.
pub(crate) fn node_name(node: Node, source: &str, language: Language) -> Option<String> {
    if let Some(name_node) = node.child_by_field_name("name") {
        return Some(node_text(name_node, source));
    }

    match language {
        // Go types: `type Foo struct { ... }` nests the name in type_spec.
        Language::Go => {
            let specs = find_nodes(node, &["type_spec"]);
            specs
                .first()
                .and_then(|s| s.child_by_field_name("name"))
                .map(|n| node_text(n, source))
        }
        // Rust impl blocks: name by the implemented type.
        Language::Rust if node.kind() == "impl_item" => node
            .child_by_field_name("type")
            .map(|n| node_text(n, source)),
        // C/C++ functions: dig through the declarator chain to the identifier.
        Language::C | Language::Cpp => {
            let mut current = node.child_by_field_name("declarator");
            while let Some(decl) = current {
                match decl.kind() {
                    "identifier" | "field_identifier" | "qualified_identifier"
                    | "destructor_name" | "operator_name" => {
                        return Some(node_text(decl, source));
                    }
                    _ => current = decl.child_by_field_name("declarator"),
                }
            }
            None
        }
        // Kotlin and Swift identifiers are plain children, not named fields.
        Language::Kotlin | Language::Swift => {
            let mut cursor = node.walk();
            let result = node.children(&mut cursor)
                .find(|c| matches!(c.kind(), "simple_identifier" | "type_identifier" | "identifier"))
                .map(|n| node_text(n, source));
            result
        }
        _ => None,
    }
}

/// Extract the documentation attached to a declaration, dispatching by
/// language convention.
pub(crate) fn docstring_for(node: Node, source: &str, language: Language) -> Option<String> {
    match language {
        Language::Python => python_docstring(node, source),
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            preceding_jsdoc(node, source)
        }
        Language::C | Language::Cpp => preceding_block_comment(node, source),
        Language::Go
        | Language::Rust
        | Language::Java
        | Language::Swift
        | Language::Ruby
        | Language::Php
        | Language::Kotlin
        | Language::CSharp => preceding_comment_block(node, source),
        Language::Unknown => None,
    }
}

/// Python: the first string expression inside the body block.
fn python_docstring(node: Node, source: &str) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let mut cursor = body.walk();
    let first = body.named_children(&mut cursor).next()?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let mut inner_cursor = first.walk();
    let string_node = first
        .named_children(&mut inner_cursor)
        .find(|c| c.kind() == "string")?;
    let raw = node_text(string_node, source);
    Some(strip_string_quotes(&raw))
}

/// JS/TS: a directly preceding `/** ... */` comment.
fn preceding_jsdoc(node: Node, source: &str) -> Option<String> {
    let prev = previous_comment(node)?;
    let text = node_text(prev, source);
    if !text.starts_with("/**") {
        return None;
    }
    Some(clean_comment_text(&text))
}

/// C/C++: the immediately preceding block comment.
fn preceding_block_comment(node: Node, source: &str) -> Option<String> {
    let prev = previous_comment(node)?;
    if prev.end_position().row + 1 < node.start_position().row {
        return None;
    }
    let text = node_text(prev, source);
    if !text.starts_with("/*") {
        return None;
    }
    Some(clean_comment_text(&text))
}

/// The contiguous block of comments immediately preceding a declaration:
/// each comment must sit directly above the next (no blank line gaps).
fn preceding_comment_block(node: Node, source: &str) -> Option<String> {
    let mut comments = Vec::new();
    let mut boundary_row = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(prev) = current {
        if !is_comment_kind(prev.kind()) {
            break;
        }
        if prev.end_position().row + 1 < boundary_row {
            break;
        }
        boundary_row = prev.start_position().row;
        comments.push(node_text(prev, source));
        current = prev.prev_sibling();
    }

    if comments.is_empty() {
        return None;
    }
    comments.reverse();
    let cleaned = comments
        .iter()
        .map(|c| clean_comment_text(c))
        .collect::<Vec<_>>()
        .join("\n");
    let cleaned = cleaned.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn previous_comment(node: Node) -> Option<Node> {
    let prev = node.prev_sibling()?;
    is_comment_kind(prev.kind()).then_some(prev)
}

fn is_comment_kind(kind: &str) -> bool {
    matches!(
        kind,
        "comment" | "line_comment" | "block_comment" | "doc_comment" | "multiline_comment"
    )
}

/// Strip comment markers while preserving the text layout.
pub(crate) fn clean_comment_text(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("/**") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("/*!") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("/*") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("*/") {
        text = stripped;
    }

    text.lines()
        .map(|line| {
            let line = line.trim_start();
            let line = line
                .strip_prefix("///")
                .or_else(|| line.strip_prefix("//!"))
                .or_else(|| line.strip_prefix("//"))
                .or_else(|| line.strip_prefix("#"))
                .or_else(|| line.strip_prefix("*"))
                .unwrap_or(line);
            line.trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn strip_string_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.len() >= quote.len() * 2
            && trimmed.starts_with(quote)
            && trimmed.ends_with(quote)
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()]
                .trim()
                .to_string();
        }
    }
    trimmed.to_string()
}

/// Names of parent classes/interfaces declared in a class node's heritage
/// clauses.
pub(crate) fn parent_class_names(class_node: Node, source: &str, language: Language) -> Vec<String> {
    let heritage_kinds = heritage_node_kinds(language);
    if heritage_kinds.is_empty() {
        return Vec::new();
    }

    // Some grammars nest the heritage clause one level down, so search the
    // subtree but ignore clauses that belong to a nested class.
    let mut names = Vec::new();
    for heritage in find_nodes(class_node, heritage_kinds) {
        if enclosing_class_id(heritage, language) == Some(class_node.id()) {
            collect_identifier_names(heritage, source, &mut names);
        }
    }
    names
}

/// Id of the nearest class-like ancestor, if any. Used both for heritage
/// attribution and for the chunker's "top-level function" check.
pub(crate) fn enclosing_class_id(node: Node, language: Language) -> Option<usize> {
    let kinds = class_node_kinds(language);
    let mut current = node.parent();
    while let Some(parent) = current {
        if kinds.contains(&parent.kind()) {
            return Some(parent.id());
        }
        current = parent.parent();
    }
    None
}

fn collect_identifier_names(node: Node, source: &str, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "identifier" | "type_identifier" | "constant" | "name" | "simple_identifier" => {
                let name = node_text(child, source);
                if !name.is_empty() && !out.contains(&name) {
                    out.push(name);
                }
            }
            _ => collect_identifier_names(child, source, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str, language: Language) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(&grammar_for(language).unwrap()).unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn test_python_docstring() {
        let source = r#"
def add(a, b):
    """Add two numbers."""
    return a + b
"#;
        let tree = parse(source, Language::Python);
        let functions = find_nodes(tree.root_node(), &["function_definition"]);
        assert_eq!(functions.len(), 1);
        assert_eq!(
            docstring_for(functions[0], source, Language::Python),
            Some("Add two numbers.".to_string())
        );
    }

    #[test]
    fn test_go_doc_comment_block() {
        let source = r#"
package main

// Greet returns a greeting
// for the given name.
func Greet(name string) string {
	return "hello " + name
}
"#;
        let tree = parse(source, Language::Go);
        let functions = find_nodes(tree.root_node(), &["function_declaration"]);
        assert_eq!(functions.len(), 1);
        let doc = docstring_for(functions[0], source, Language::Go).unwrap();
        assert_eq!(doc, "Greet returns a greeting\nfor the given name.");
    }

    #[test]
    fn test_go_comment_with_gap_is_not_doc() {
        let source = r#"
package main

// stray comment

func Orphan() {}
"#;
        let tree = parse(source, Language::Go);
        let functions = find_nodes(tree.root_node(), &["function_declaration"]);
        assert_eq!(docstring_for(functions[0], source, Language::Go), None);
    }

    #[test]
    fn test_rust_doc_comments() {
        let source = r#"
/// Parses a thing.
/// Returns None on failure.
fn parse_thing(input: &str) -> Option<u32> {
    input.parse().ok()
}
"#;
        let tree = parse(source, Language::Rust);
        let functions = find_nodes(tree.root_node(), &["function_item"]);
        let doc = docstring_for(functions[0], source, Language::Rust).unwrap();
        assert!(doc.contains("Parses a thing."));
        assert!(doc.contains("Returns None on failure."));
    }

    #[test]
    fn test_jsdoc_extraction() {
        let source = r#"
/** Formats a user for display. */
function formatUser(user) {
    return user.name;
}
"#;
        let tree = parse(source, Language::JavaScript);
        let functions = find_nodes(tree.root_node(), &["function_declaration"]);
        assert_eq!(
            docstring_for(functions[0], source, Language::JavaScript),
            Some("Formats a user for display.".to_string())
        );
    }

    #[test]
    fn test_node_name_field_and_fallbacks() {
        let py = "class Widget:\n    pass\n";
        let tree = parse(py, Language::Python);
        let classes = find_nodes(tree.root_node(), &["class_definition"]);
        assert_eq!(
            node_name(classes[0], py, Language::Python),
            Some("Widget".to_string())
        );

        let go = "package main\n\ntype Server struct{}\n";
        let tree = parse(go, Language::Go);
        let types = find_nodes(tree.root_node(), &["type_declaration"]);
        assert_eq!(node_name(types[0], go, Language::Go), Some("Server".to_string()));

        let c = "int main(int argc, char **argv) { return 0; }\n";
        let tree = parse(c, Language::C);
        let functions = find_nodes(tree.root_node(), &["function_definition"]);
        assert_eq!(node_name(functions[0], c, Language::C), Some("main".to_string()));
    }

    #[test]
    fn test_python_parent_classes() {
        let source = "class Derived(Base, mixins.Loggable):\n    pass\n";
        let tree = parse(source, Language::Python);
        let classes = find_nodes(tree.root_node(), &["class_definition"]);
        let parents = parent_class_names(classes[0], source, Language::Python);
        assert!(parents.contains(&"Base".to_string()));
        assert!(parents.iter().any(|p| p.contains("Loggable") || p.contains("mixins")));
    }

    #[test]
    fn test_java_parent_classes() {
        let source = "class Child extends Parent implements Closeable, Runnable {}\n";
        let tree = parse(source, Language::Java);
        let classes = find_nodes(tree.root_node(), &["class_declaration"]);
        let parents = parent_class_names(classes[0], source, Language::Java);
        assert!(parents.contains(&"Parent".to_string()));
        assert!(parents.contains(&"Closeable".to_string()));
        assert!(parents.contains(&"Runnable".to_string()));
    }

    #[test]
    fn test_clean_comment_text_markers() {
        assert_eq!(clean_comment_text("// one\n// two"), "one\ntwo");
        assert_eq!(clean_comment_text("/** doc */"), "doc");
        assert_eq!(clean_comment_text("/* a\n * b\n */"), "a\nb");
        assert_eq!(clean_comment_text("# ruby style"), "ruby style");
    }

    #[tokio::test]
    async fn test_chunk_file_rejects_unknown_language() {
        let parser = TreeSitterParser::new();
        let result = parser.chunk_file(b"text", "notes.txt", Language::Unknown).await;
        assert!(matches!(result, Err(DomainError::Parse(_))));
    }
}
