use serde::{Deserialize, Serialize};

const MAX_SNIPPETS: usize = 3;
const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub path: String,
    pub title: String,
    pub headings: Vec<String>,
    pub snippets: Vec<String>,
}

/// Build the `search.json` payload: headings plus leading prose snippets for
/// every generated page.
pub fn build_search_index(pages: &[(String, String, String)]) -> Vec<SearchEntry> {
    pages
        .iter()
        .map(|(path, title, content)| SearchEntry {
            path: path.clone(),
            title: title.clone(),
            headings: extract_headings(content),
            snippets: extract_snippets(content),
        })
        .collect()
}

fn extract_headings(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

fn extract_snippets(content: &str) -> Vec<String> {
    let mut snippets = Vec::new();
    let mut in_fence = false;

    for paragraph in content.split("\n\n") {
        if snippets.len() >= MAX_SNIPPETS {
            break;
        }
        let trimmed = paragraph.trim();
        let fence_markers = trimmed.matches("```").count();
        if fence_markers > 0 {
            if fence_markers % 2 == 1 {
                in_fence = !in_fence;
            }
            continue;
        }
        if in_fence || trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('-') {
            continue;
        }
        let flattened = trimmed.replace('\n', " ");
        let snippet: String = flattened.chars().take(SNIPPET_CHARS).collect();
        snippets.push(snippet);
    }
    snippets
}
