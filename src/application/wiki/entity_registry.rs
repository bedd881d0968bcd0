use std::collections::HashMap;

use crate::domain::{Chunk, ChunkKind};

/// Where one named entity (class, function, method) is defined.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub name: String,
    pub file_path: String,
    pub kind: ChunkKind,
    /// File stem of the defining file, for `mod.Name` qualified matches.
    pub module: String,
}

/// Registry of every defined entity encountered while chunking, built once
/// per wiki run and passed by value into the post-processors.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    by_name: HashMap<String, Vec<EntityInfo>>,
}

impl EntityRegistry {
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a Chunk>) -> Self {
        let mut registry = Self::default();
        for chunk in chunks {
            if !matches!(
                chunk.kind(),
                ChunkKind::Class | ChunkKind::Function | ChunkKind::Method
            ) {
                continue;
            }
            let Some(name) = chunk.name() else { continue };
            registry.insert(EntityInfo {
                name: name.to_string(),
                file_path: chunk.file_path().to_string(),
                kind: chunk.kind(),
                module: file_stem(chunk.file_path()),
            });
        }
        registry
    }

    fn insert(&mut self, info: EntityInfo) {
        let entries = self.by_name.entry(info.name.clone()).or_default();
        // A class and its same-named constructor may both land here; one
        // entry per defining file is enough.
        if !entries.iter().any(|e| e.file_path == info.file_path) {
            entries.push(info);
        }
    }

    /// Unambiguous lookup: exactly one defining file, or nothing.
    pub fn resolve(&self, name: &str) -> Option<&EntityInfo> {
        match self.by_name.get(name) {
            Some(entries) if entries.len() == 1 => entries.first(),
            _ => None,
        }
    }

    /// `mod.Name` lookup: the qualified form disambiguates by file stem.
    pub fn resolve_qualified(&self, module: &str, name: &str) -> Option<&EntityInfo> {
        self.by_name
            .get(name)
            .and_then(|entries| entries.iter().find(|e| e.module == module))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;

    fn chunk(path: &str, name: &str, kind: ChunkKind) -> Chunk {
        Chunk::new(path, Language::Python, kind, "body", 1, 5).with_name(name)
    }

    #[test]
    fn test_resolve_unique_entity() {
        let chunks = vec![
            chunk("src/cache.py", "Cache", ChunkKind::Class),
            chunk("src/util.py", "helper", ChunkKind::Function),
        ];
        let registry = EntityRegistry::from_chunks(&chunks);

        assert_eq!(registry.resolve("Cache").unwrap().file_path, "src/cache.py");
        assert_eq!(registry.resolve("helper").unwrap().file_path, "src/util.py");
        assert!(registry.resolve("Missing").is_none());
    }

    #[test]
    fn test_ambiguous_names_stay_unresolved() {
        let chunks = vec![
            chunk("src/a.py", "run", ChunkKind::Function),
            chunk("src/b.py", "run", ChunkKind::Function),
        ];
        let registry = EntityRegistry::from_chunks(&chunks);

        assert!(registry.resolve("run").is_none());
        assert_eq!(
            registry.resolve_qualified("a", "run").unwrap().file_path,
            "src/a.py"
        );
        assert_eq!(
            registry.resolve_qualified("b", "run").unwrap().file_path,
            "src/b.py"
        );
    }

    #[test]
    fn test_non_defining_chunks_are_ignored() {
        let chunks = vec![
            chunk("src/a.py", "a", ChunkKind::Module),
            chunk("src/a.py", "imports", ChunkKind::Import),
        ];
        let registry = EntityRegistry::from_chunks(&chunks);
        assert!(registry.is_empty());
    }
}
