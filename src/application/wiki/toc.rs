use serde::{Deserialize, Serialize};

pub const TOC_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toc {
    pub version: u32,
    pub sections: Vec<TocSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocSection {
    /// Hierarchical 1.2-style number.
    pub number: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TocSection>,
}

/// Build the hierarchical TOC: one numbered section per catalog page, then a
/// "Source Files" section mirroring the `files/` directory tree.
pub fn build_toc(catalog_pages: &[(String, String)], file_pages: &[String]) -> Toc {
    let mut sections = Vec::new();

    for (i, (path, title)) in catalog_pages.iter().enumerate() {
        sections.push(TocSection {
            number: format!("{}", i + 1),
            title: title.clone(),
            path: Some(path.clone()),
            children: Vec::new(),
        });
    }

    if !file_pages.is_empty() {
        let number = format!("{}", sections.len() + 1);
        let mut root = DirNode::default();
        let mut sorted = file_pages.to_vec();
        sorted.sort();
        for page in &sorted {
            // files/src/a.rs.md → components [src, a.rs.md]
            let components: Vec<&str> = page
                .strip_prefix("files/")
                .unwrap_or(page)
                .split('/')
                .collect();
            root.insert(&components, page);
        }
        sections.push(TocSection {
            number: number.clone(),
            title: "Source Files".to_string(),
            path: None,
            children: root.into_sections(&number),
        });
    }

    Toc {
        version: TOC_VERSION,
        sections,
    }
}

#[derive(Default)]
struct DirNode {
    dirs: Vec<(String, DirNode)>,
    leaves: Vec<(String, String)>,
}

impl DirNode {
    fn insert(&mut self, components: &[&str], page: &str) {
        match components {
            [] => {}
            [leaf] => {
                let title = leaf.strip_suffix(".md").unwrap_or(leaf).to_string();
                self.leaves.push((title, page.to_string()));
            }
            [dir, rest @ ..] => {
                let node = match self.dirs.iter_mut().find(|(name, _)| name == dir) {
                    Some((_, node)) => node,
                    None => {
                        self.dirs.push((dir.to_string(), DirNode::default()));
                        &mut self.dirs.last_mut().expect("just pushed").1
                    }
                };
                node.insert(rest, page);
            }
        }
    }

    fn into_sections(self, prefix: &str) -> Vec<TocSection> {
        let mut sections = Vec::new();
        let mut index = 1;

        for (name, node) in self.dirs {
            let number = format!("{}.{}", prefix, index);
            sections.push(TocSection {
                number: number.clone(),
                title: name,
                path: None,
                children: node.into_sections(&number),
            });
            index += 1;
        }
        for (title, page) in self.leaves {
            sections.push(TocSection {
                number: format!("{}.{}", prefix, index),
                title,
                path: Some(page),
                children: Vec::new(),
            });
            index += 1;
        }
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_pages_numbered_sequentially() {
        let toc = build_toc(
            &[
                ("index.md".to_string(), "Overview".to_string()),
                ("architecture.md".to_string(), "Architecture".to_string()),
            ],
            &[],
        );
        assert_eq!(toc.version, TOC_VERSION);
        assert_eq!(toc.sections.len(), 2);
        assert_eq!(toc.sections[0].number, "1");
        assert_eq!(toc.sections[1].number, "2");
        assert_eq!(toc.sections[1].path.as_deref(), Some("architecture.md"));
    }

    #[test]
    fn test_file_tree_nests_with_dotted_numbers() {
        let toc = build_toc(
            &[("index.md".to_string(), "Overview".to_string())],
            &[
                "files/src/indexer.rs.md".to_string(),
                "files/src/store.rs.md".to_string(),
                "files/main.rs.md".to_string(),
            ],
        );

        let files_section = &toc.sections[1];
        assert_eq!(files_section.number, "2");
        assert_eq!(files_section.title, "Source Files");

        // Directory children precede leaves; both carry dotted numbers.
        let src = &files_section.children[0];
        assert_eq!(src.title, "src");
        assert_eq!(src.number, "2.1");
        assert_eq!(src.children.len(), 2);
        assert_eq!(src.children[0].number, "2.1.1");
        assert_eq!(src.children[0].title, "indexer.rs");
        assert_eq!(
            src.children[0].path.as_deref(),
            Some("files/src/indexer.rs.md")
        );

        let main = &files_section.children[1];
        assert_eq!(main.title, "main.rs");
        assert_eq!(main.number, "2.2");
    }

    #[test]
    fn test_serialization_shape() {
        let toc = build_toc(&[("index.md".to_string(), "Overview".to_string())], &[]);
        let json = serde_json::to_value(&toc).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["sections"][0]["number"], "1");
        assert!(json["sections"][0].get("children").is_none());
    }
}
