use super::entity_registry::{EntityInfo, EntityRegistry};

/// Rewrite backticked identifiers that name known entities into links to the
/// file page where they are defined.
///
/// Rules: a span must be a bare identifier or a `mod.Name` qualified form;
/// the qualified form wins ambiguity by file stem; remaining ties are left
/// unlinked; spans inside fenced code blocks or existing links are untouched.
pub fn crosslink(markdown: &str, registry: &EntityRegistry, current_page: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut in_fence = false;

    for (i, line) in markdown.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push_str(line);
            continue;
        }
        if in_fence {
            out.push_str(line);
            continue;
        }
        out.push_str(&crosslink_line(line, registry, current_page));
    }

    if markdown.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn crosslink_line(line: &str, registry: &EntityRegistry, current_page: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(open) = rest.find('`') {
        let (before, after_open) = rest.split_at(open);
        out.push_str(before);

        let span_body = &after_open[1..];
        let Some(close) = span_body.find('`') else {
            out.push_str(after_open);
            return out;
        };
        let span = &span_body[..close];
        let already_linked = before.ends_with('[');

        match (already_linked, resolve_span(span, registry)) {
            (false, Some(info)) if page_for(&info.file_path) != current_page => {
                let target = relative_link(current_page, &page_for(&info.file_path));
                out.push_str(&format!("[`{}`]({})", span, target));
            }
            _ => {
                out.push('`');
                out.push_str(span);
                out.push('`');
            }
        }
        rest = &span_body[close + 1..];
    }

    out.push_str(rest);
    out
}

fn resolve_span<'a>(span: &str, registry: &'a EntityRegistry) -> Option<&'a EntityInfo> {
    if let Some((module, name)) = span.split_once('.') {
        if is_identifier(module) && is_identifier(name) {
            // Language-qualified names prefer the qualified match.
            if let Some(info) = registry.resolve_qualified(module, name) {
                return Some(info);
            }
        }
    }
    if is_identifier(span) {
        return registry.resolve(span);
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Wiki page path for a source file.
pub fn page_for(file_path: &str) -> String {
    format!("files/{}.md", file_path)
}

/// Relative link from one wiki page to another.
pub fn relative_link(from_page: &str, to_page: &str) -> String {
    let from_depth = from_page.matches('/').count();
    let mut link = String::new();
    for _ in 0..from_depth {
        link.push_str("../");
    }
    link.push_str(to_page);
    link
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkKind, Language};

    fn registry() -> EntityRegistry {
        let chunks = vec![
            Chunk::new("src/cache.py", Language::Python, ChunkKind::Class, "c", 1, 9)
                .with_name("Cache"),
            Chunk::new("src/a.py", Language::Python, ChunkKind::Function, "f", 1, 3)
                .with_name("run"),
            Chunk::new("src/b.py", Language::Python, ChunkKind::Function, "f", 1, 3)
                .with_name("run"),
        ];
        EntityRegistry::from_chunks(&chunks)
    }

    #[test]
    fn test_links_unique_entity() {
        let result = crosslink("Uses `Cache` internally.", &registry(), "architecture.md");
        assert_eq!(
            result,
            "Uses [`Cache`](files/src/cache.py.md) internally."
        );
    }

    #[test]
    fn test_ambiguous_entity_left_unlinked() {
        let result = crosslink("Calls `run` twice.", &registry(), "architecture.md");
        assert_eq!(result, "Calls `run` twice.");
    }

    #[test]
    fn test_qualified_name_breaks_tie() {
        let result = crosslink("Calls `a.run` then `b.run`.", &registry(), "index.md");
        assert!(result.contains("[`a.run`](files/src/a.py.md)"));
        assert!(result.contains("[`b.run`](files/src/b.py.md)"));
    }

    #[test]
    fn test_fenced_code_blocks_untouched() {
        let input = "Text `Cache`.\n```python\ncache = `Cache`\n```\nAgain `Cache`.";
        let result = crosslink(input, &registry(), "index.md");
        assert!(result.contains("cache = `Cache`"));
        assert_eq!(result.matches("[`Cache`]").count(), 2);
    }

    #[test]
    fn test_existing_links_untouched() {
        let input = "See [`Cache`](files/src/cache.py.md).";
        let result = crosslink(input, &registry(), "index.md");
        assert_eq!(result, input);
    }

    #[test]
    fn test_no_self_link_on_own_page() {
        let result = crosslink("Defines `Cache`.", &registry(), "files/src/cache.py.md");
        assert_eq!(result, "Defines `Cache`.");
    }

    #[test]
    fn test_relative_link_from_nested_page() {
        let result = crosslink("Uses `Cache`.", &registry(), "files/src/other.py.md");
        assert_eq!(result, "Uses [`Cache`](../../../files/src/cache.py.md).");
    }

    #[test]
    fn test_non_identifier_spans_ignored() {
        let result = crosslink("Run `cargo build --release` now.", &registry(), "index.md");
        assert_eq!(result, "Run `cargo build --release` now.");
    }
}
