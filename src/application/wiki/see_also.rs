use std::collections::{BTreeMap, BTreeSet};

use super::crosslink::relative_link;

const MAX_SEE_ALSO: usize = 5;

/// Append a "See Also" section linking up to five pages ranked by how many
/// contributing source files they share with this one.
pub fn append_see_also(
    markdown: &str,
    page_path: &str,
    sources_by_page: &BTreeMap<String, BTreeSet<String>>,
    titles_by_page: &BTreeMap<String, String>,
) -> String {
    let Some(own_sources) = sources_by_page.get(page_path) else {
        return markdown.to_string();
    };
    if own_sources.is_empty() {
        return markdown.to_string();
    }

    let mut ranked: Vec<(usize, &String)> = sources_by_page
        .iter()
        .filter(|(other, _)| other.as_str() != page_path)
        .map(|(other, sources)| (own_sources.intersection(sources).count(), other))
        .filter(|(overlap, _)| *overlap > 0)
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    ranked.truncate(MAX_SEE_ALSO);

    if ranked.is_empty() {
        return markdown.to_string();
    }

    let mut out = markdown.trim_end().to_string();
    out.push_str("\n\n## See Also\n\n");
    for (overlap, other) in ranked {
        let title = titles_by_page
            .get(other)
            .cloned()
            .unwrap_or_else(|| other.clone());
        out.push_str(&format!(
            "- [{}]({}) — {} shared source file{}\n",
            title,
            relative_link(page_path, other),
            overlap,
            if overlap == 1 { "" } else { "s" }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(page, files)| {
                (
                    page.to_string(),
                    files.iter().map(|f| f.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_ranks_by_overlap_and_caps_at_five() {
        let sources = sources(&[
            ("architecture.md", &["a.rs", "b.rs", "c.rs"]),
            ("dependencies.md", &["a.rs", "b.rs"]),
            ("glossary.md", &["a.rs"]),
            ("p3.md", &["a.rs"]),
            ("p4.md", &["a.rs"]),
            ("p5.md", &["a.rs"]),
            ("p6.md", &["a.rs"]),
            ("unrelated.md", &["z.rs"]),
        ]);
        let titles = BTreeMap::new();

        let out = append_see_also("# Arch\n", "architecture.md", &sources, &titles);
        let section = out.split("## See Also").nth(1).unwrap();
        let lines: Vec<&str> = section.trim().lines().collect();

        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("dependencies.md"));
        assert!(lines[0].contains("2 shared source files"));
        assert!(!out.contains("unrelated.md"));
    }

    #[test]
    fn test_no_section_without_overlap() {
        let sources = sources(&[("a.md", &["x.rs"]), ("b.md", &["y.rs"])]);
        let out = append_see_also("# A\n", "a.md", &sources, &BTreeMap::new());
        assert!(!out.contains("See Also"));
    }
}
