use crate::domain::Chunk;

/// Append a "Relevant Source Files" section listing the exact line ranges of
/// the chunks that contributed to a page.
pub fn append_source_refs(markdown: &str, chunks: &[&Chunk]) -> String {
    if chunks.is_empty() {
        return markdown.to_string();
    }

    let mut refs: Vec<(String, u32, u32)> = chunks
        .iter()
        .map(|c| (c.file_path().to_string(), c.start_line(), c.end_line()))
        .collect();
    refs.sort();
    refs.dedup();

    let mut out = markdown.trim_end().to_string();
    out.push_str("\n\n## Relevant Source Files\n\n");
    for (path, start, end) in refs {
        out.push_str(&format!("- `{}:{}-{}`\n", path, start, end));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChunkKind, Language};

    #[test]
    fn test_appends_sorted_unique_ranges() {
        let a = Chunk::new("src/b.rs", Language::Rust, ChunkKind::Function, "f", 10, 20);
        let b = Chunk::new("src/a.rs", Language::Rust, ChunkKind::Class, "c", 1, 50);
        let dup = Chunk::new("src/b.rs", Language::Rust, ChunkKind::Function, "f", 10, 20);

        let out = append_source_refs("# Page\n\nBody.\n", &[&a, &b, &dup]);
        let refs_section = out.split("## Relevant Source Files").nth(1).unwrap();
        let lines: Vec<&str> = refs_section.trim().lines().collect();
        assert_eq!(lines, vec!["- `src/a.rs:1-50`", "- `src/b.rs:10-20`"]);
    }

    #[test]
    fn test_no_section_without_chunks() {
        let out = append_source_refs("# Page\n", &[]);
        assert!(!out.contains("Relevant Source Files"));
    }
}
