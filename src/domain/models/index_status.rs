use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Language;
use crate::domain::DomainError;

/// Current on-disk schema for `index_status.json`. Version 1 documents lacked
/// `files_by_language`; the upgrader derives it from the file list.
pub const INDEX_STATUS_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub language: Option<Language>,
    pub size_bytes: u64,
    pub modified_epoch: u64,
    pub content_hash: String,
    pub chunk_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub schema_version: u32,
    pub repo_path: String,
    pub indexed_at_epoch: u64,
    pub total_files: u64,
    pub total_chunks: u64,
    pub files_by_language: BTreeMap<String, u64>,
    pub files: Vec<FileInfo>,
}

impl IndexStatus {
    pub fn new(repo_path: impl Into<String>, indexed_at_epoch: u64, files: Vec<FileInfo>) -> Self {
        let files_by_language = count_by_language(&files);
        let total_files = files.len() as u64;
        let total_chunks = files.iter().map(|f| f.chunk_count).sum();
        Self {
            schema_version: INDEX_STATUS_SCHEMA_VERSION,
            repo_path: repo_path.into(),
            indexed_at_epoch,
            total_files,
            total_chunks,
            files_by_language,
            files,
        }
    }

    pub fn hash_for(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content_hash.as_str())
    }

    /// Hash over the whole status document, stamped into the wiki status so a
    /// wiki knows which index generation it was produced from.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.path.as_bytes());
            hasher.update(b":");
            hasher.update(file.content_hash.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn count_by_language(files: &[FileInfo]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for file in files {
        let key = file
            .language
            .map(|l| l.as_str().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// SHA-256 of a file's raw bytes. Hashing bytes rather than decoded text keeps
/// provenance stable for files with malformed UTF-8.
pub fn compute_file_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Parse a persisted status document, applying forward migrations from older
/// schema versions before deserializing.
pub fn upgrade_index_status(raw: &str) -> Result<IndexStatus, DomainError> {
    let mut value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| DomainError::store(format!("Corrupt index status: {}", e)))?;

    let version = value
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as u32;

    if version > INDEX_STATUS_SCHEMA_VERSION {
        return Err(DomainError::store(format!(
            "Index status schema version {} is newer than supported version {}",
            version, INDEX_STATUS_SCHEMA_VERSION
        )));
    }

    if version < 2 {
        migrate_v1_to_v2(&mut value);
    }

    serde_json::from_value(value)
        .map_err(|e| DomainError::store(format!("Corrupt index status after migration: {}", e)))
}

/// v1 → v2: introduce `files_by_language`, derived from the file list.
fn migrate_v1_to_v2(value: &mut serde_json::Value) {
    let counts: BTreeMap<String, u64> = value
        .get("files")
        .and_then(|f| f.as_array())
        .map(|files| {
            let mut counts = BTreeMap::new();
            for file in files {
                let key = file
                    .get("language")
                    .and_then(|l| l.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                *counts.entry(key).or_insert(0) += 1;
            }
            counts
        })
        .unwrap_or_default();

    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "files_by_language".to_string(),
            serde_json::to_value(counts).unwrap_or_default(),
        );
        obj.insert(
            "schema_version".to_string(),
            serde_json::Value::from(INDEX_STATUS_SCHEMA_VERSION),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(path: &str, language: Language, hash: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            language: Some(language),
            size_bytes: 100,
            modified_epoch: 1_700_000_000,
            content_hash: hash.to_string(),
            chunk_count: 3,
        }
    }

    #[test]
    fn test_new_status_aggregates_totals() {
        let status = IndexStatus::new(
            "/repo",
            1_700_000_000,
            vec![
                sample_file("a.py", Language::Python, "aaa"),
                sample_file("b.py", Language::Python, "bbb"),
                sample_file("c.go", Language::Go, "ccc"),
            ],
        );
        assert_eq!(status.schema_version, INDEX_STATUS_SCHEMA_VERSION);
        assert_eq!(status.total_files, 3);
        assert_eq!(status.total_chunks, 9);
        assert_eq!(status.files_by_language.get("python"), Some(&2));
        assert_eq!(status.files_by_language.get("go"), Some(&1));
    }

    #[test]
    fn test_content_hash_tracks_file_hashes() {
        let base = IndexStatus::new("/repo", 0, vec![sample_file("a.py", Language::Python, "aaa")]);
        let changed =
            IndexStatus::new("/repo", 0, vec![sample_file("a.py", Language::Python, "xyz")]);
        assert_ne!(base.content_hash(), changed.content_hash());
    }

    #[test]
    fn test_upgrade_from_v1_derives_language_counts() {
        let v1 = serde_json::json!({
            "schema_version": 1,
            "repo_path": "/repo",
            "indexed_at_epoch": 1,
            "total_files": 2,
            "total_chunks": 6,
            "files": [
                {"path": "a.py", "language": "python", "size_bytes": 1,
                 "modified_epoch": 1, "content_hash": "aaa", "chunk_count": 3},
                {"path": "b.go", "language": "go", "size_bytes": 1,
                 "modified_epoch": 1, "content_hash": "bbb", "chunk_count": 3}
            ]
        });
        let status = upgrade_index_status(&v1.to_string()).unwrap();
        assert_eq!(status.schema_version, INDEX_STATUS_SCHEMA_VERSION);
        assert_eq!(status.files_by_language.get("python"), Some(&1));
        assert_eq!(status.files_by_language.get("go"), Some(&1));
    }

    #[test]
    fn test_upgrade_rejects_future_schema() {
        let future = serde_json::json!({"schema_version": 99, "files": []});
        assert!(upgrade_index_status(&future.to_string()).is_err());
    }
}
