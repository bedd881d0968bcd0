use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use glob::Pattern;
use ignore::WalkBuilder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{EmbeddingService, ParserService, VectorStore};
use crate::config;
use crate::domain::{
    compute_file_hash, upgrade_index_status, DomainError, FileInfo, IndexStatus, Language,
};

pub const DEEPWIKI_DIR: &str = ".deepwiki";
pub const INDEX_STATUS_FILE: &str = "index_status.json";

/// Invoked once per file batch with `(message, current, total)`.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

#[derive(Default, Clone)]
pub struct IndexOptions {
    /// Restrict indexing to these languages; `None` means all supported.
    pub languages: Option<Vec<Language>>,
    pub full_rebuild: bool,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

/// A repository file that passed discovery filters, with its content hash.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub language: Language,
    pub size_bytes: u64,
    pub modified_epoch: u64,
    pub content_hash: String,
}

/// The per-run change set computed from the prior status.
#[derive(Debug, Default)]
pub struct FileDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
}

pub struct IndexRepositoryUseCase {
    parser: Arc<dyn ParserService>,
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
}

impl IndexRepositoryUseCase {
    pub fn new(
        parser: Arc<dyn ParserService>,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            parser,
            embedder,
            store,
        }
    }

    pub async fn execute(
        &self,
        repo_path: &Path,
        options: IndexOptions,
    ) -> Result<IndexStatus, DomainError> {
        let repo_path = repo_path
            .canonicalize()
            .map_err(|e| DomainError::invalid_input(format!("Invalid repository path: {}", e)))?;
        let start_time = Instant::now();

        // Step 1: discover and hash the current file set.
        let current = self.discover(&repo_path, options.languages.as_deref()).await?;
        info!("Discovered {} indexable files", current.len());

        // Step 2: diff against the prior status.
        let prior = if options.full_rebuild {
            None
        } else {
            load_status(&repo_path).await?
        };
        let diff = compute_diff(prior.as_ref(), &current);
        info!(
            "Change set: {} added, {} changed, {} removed, {} unchanged",
            diff.added.len(),
            diff.changed.len(),
            diff.removed.len(),
            diff.unchanged.len()
        );

        if options.full_rebuild {
            // Purge any rows from earlier runs, including files that no
            // longer exist in the tree.
            let stale = self.store.list_files().await?;
            if !stale.is_empty() {
                self.store.delete_by_files(&stale).await?;
            }
        }

        // Step 3: deletion strictly precedes re-insertion for each file.
        let mut to_delete: Vec<String> = diff.removed.clone();
        to_delete.extend(diff.changed.iter().cloned());
        if !to_delete.is_empty() {
            let deleted = self.store.delete_by_files(&to_delete).await?;
            debug!("Deleted {} stale chunks", deleted);
        }

        // Step 4: parse, chunk, embed, upsert in file batches.
        let by_path: HashMap<&str, &DiscoveredFile> = current
            .iter()
            .map(|f| (f.relative_path.as_str(), f))
            .collect();
        let mut to_process: Vec<&DiscoveredFile> = diff
            .added
            .iter()
            .chain(diff.changed.iter())
            .filter_map(|p| by_path.get(p.as_str()).copied())
            .collect();
        to_process.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

        let batch_size = config::current().chunking.batch_size.max(1);
        let total = to_process.len() as u64;
        let mut processed = 0u64;
        let mut indexed: Vec<FileInfo> = Vec::new();

        for batch in to_process.chunks(batch_size) {
            if options.cancel.is_cancelled() {
                info!("Indexing cancelled before batch; prior status remains authoritative");
                return Err(DomainError::Cancelled);
            }

            match self.process_batch(batch).await {
                Ok(infos) => indexed.extend(infos),
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    // The batch's files stay out of the new status so the next
                    // run retries them; the rest of the run continues.
                    warn!(
                        "Batch of {} files failed and will be retried next run: {}",
                        batch.len(),
                        e
                    );
                }
            }

            processed += batch.len() as u64;
            if let Some(progress) = &options.progress {
                let message = batch
                    .last()
                    .map(|f| f.relative_path.clone())
                    .unwrap_or_default();
                progress(&message, processed, total);
            }
        }

        // Step 5: persist the new status (unchanged files carry forward).
        let mut files = indexed;
        if let Some(prior) = &prior {
            let unchanged: HashSet<&str> = diff.unchanged.iter().map(String::as_str).collect();
            files.extend(
                prior
                    .files
                    .iter()
                    .filter(|f| unchanged.contains(f.path.as_str()))
                    .cloned(),
            );
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let status = IndexStatus::new(
            repo_path.to_string_lossy().to_string(),
            now_epoch(),
            files,
        );
        save_status(&repo_path, &status).await?;

        info!(
            "Indexing complete: {} files, {} chunks in {:.2}s",
            status.total_files,
            status.total_chunks,
            start_time.elapsed().as_secs_f64()
        );
        Ok(status)
    }

    /// Walk the repository, applying exclude globs, the language filter, and
    /// the size ceiling; hash every surviving file.
    async fn discover(
        &self,
        repo_path: &Path,
        languages: Option<&[Language]>,
    ) -> Result<Vec<DiscoveredFile>, DomainError> {
        let parsing = config::current().parsing.clone();
        let excludes: Vec<Pattern> = parsing
            .exclude_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();
        let configured_languages: Option<Vec<Language>> = if parsing.languages.is_empty() {
            None
        } else {
            Some(
                parsing
                    .languages
                    .iter()
                    .filter_map(|l| Language::parse_strict(l))
                    .collect(),
            )
        };

        let mut discovered = Vec::new();
        let walker = WalkBuilder::new(repo_path)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error walking directory: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let relative_path = path
                .strip_prefix(repo_path)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            if relative_path.starts_with(DEEPWIKI_DIR) {
                continue;
            }
            if excludes.iter().any(|p| p.matches(&relative_path)) {
                continue;
            }

            let language = Language::from_path(path);
            if !language.is_known() || !self.parser.supports_language(language) {
                continue;
            }
            if let Some(filter) = languages {
                if !filter.contains(&language) {
                    continue;
                }
            }
            if let Some(filter) = &configured_languages {
                if !filter.contains(&language) {
                    continue;
                }
            }

            let metadata = match tokio::fs::metadata(path).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to stat {}: {}", relative_path, e);
                    continue;
                }
            };
            if metadata.len() > parsing.max_file_size {
                debug!(
                    "Skipping oversized file {} ({} bytes)",
                    relative_path,
                    metadata.len()
                );
                continue;
            }

            let bytes = match tokio::fs::read(path).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Failed to read {}: {}", relative_path, e);
                    continue;
                }
            };

            discovered.push(DiscoveredFile {
                relative_path,
                absolute_path: path.to_path_buf(),
                language,
                size_bytes: metadata.len(),
                modified_epoch: metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
                content_hash: compute_file_hash(&bytes),
            });
        }

        discovered.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        Ok(discovered)
    }

    /// Parse, chunk, embed and upsert one batch of files. Files that fail to
    /// read or parse are skipped individually; embedding and store failures
    /// are retried once before failing the whole batch.
    async fn process_batch(&self, batch: &[&DiscoveredFile]) -> Result<Vec<FileInfo>, DomainError> {
        let mut batch_chunks = Vec::new();
        let mut infos = Vec::new();

        for file in batch {
            let bytes = match tokio::fs::read(&file.absolute_path).await {
                Ok(b) => b,
                Err(e) => {
                    warn!("Failed to read {}: {}", file.relative_path, e);
                    continue;
                }
            };

            let chunks = match self
                .parser
                .chunk_file(&bytes, &file.relative_path, file.language)
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    debug!("Failed to parse {}: {}", file.relative_path, e);
                    continue;
                }
            };

            infos.push(FileInfo {
                path: file.relative_path.clone(),
                language: Some(file.language),
                size_bytes: file.size_bytes,
                modified_epoch: file.modified_epoch,
                content_hash: file.content_hash.clone(),
                chunk_count: chunks.len() as u64,
            });
            batch_chunks.extend(chunks);
        }

        if batch_chunks.is_empty() {
            return Ok(infos);
        }

        let embeddings = match self.embedder.embed_chunks(&batch_chunks).await {
            Ok(e) => e,
            Err(first) => {
                if first.is_cancellation() {
                    return Err(first);
                }
                warn!("Embedding batch failed, retrying once: {}", first);
                self.embedder.embed_chunks(&batch_chunks).await?
            }
        };

        if let Err(first) = self.store.upsert(&batch_chunks, &embeddings).await {
            if first.is_cancellation() {
                return Err(first);
            }
            warn!("Store upsert failed, retrying once: {}", first);
            self.store.upsert(&batch_chunks, &embeddings).await?;
        }

        Ok(infos)
    }
}

/// Set difference against the prior status by path and content hash.
pub fn compute_diff(prior: Option<&IndexStatus>, current: &[DiscoveredFile]) -> FileDiff {
    let Some(prior) = prior else {
        return FileDiff {
            added: current.iter().map(|f| f.relative_path.clone()).collect(),
            ..FileDiff::default()
        };
    };

    let prior_hashes: HashMap<&str, &str> = prior
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.content_hash.as_str()))
        .collect();
    let current_paths: HashSet<&str> = current.iter().map(|f| f.relative_path.as_str()).collect();

    let mut diff = FileDiff::default();
    for file in current {
        match prior_hashes.get(file.relative_path.as_str()) {
            None => diff.added.push(file.relative_path.clone()),
            Some(hash) if *hash != file.content_hash => {
                diff.changed.push(file.relative_path.clone())
            }
            Some(_) => diff.unchanged.push(file.relative_path.clone()),
        }
    }
    for file in &prior.files {
        if !current_paths.contains(file.path.as_str()) {
            diff.removed.push(file.path.clone());
        }
    }
    diff
}

pub fn status_path(repo_path: &Path) -> PathBuf {
    repo_path.join(DEEPWIKI_DIR).join(INDEX_STATUS_FILE)
}

pub async fn load_status(repo_path: &Path) -> Result<Option<IndexStatus>, DomainError> {
    let path = status_path(repo_path);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => Ok(Some(upgrade_index_status(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DomainError::store(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

pub async fn save_status(repo_path: &Path, status: &IndexStatus) -> Result<(), DomainError> {
    let path = status_path(repo_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let raw = serde_json::to_string_pretty(status)
        .map_err(|e| DomainError::store(format!("Failed to serialize index status: {}", e)))?;
    tokio::fs::write(&path, raw).await?;
    Ok(())
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(path: &str, hash: &str) -> DiscoveredFile {
        DiscoveredFile {
            relative_path: path.to_string(),
            absolute_path: PathBuf::from(path),
            language: Language::Python,
            size_bytes: 10,
            modified_epoch: 0,
            content_hash: hash.to_string(),
        }
    }

    fn status_with(files: &[(&str, &str)]) -> IndexStatus {
        IndexStatus::new(
            "/repo",
            0,
            files
                .iter()
                .map(|(path, hash)| FileInfo {
                    path: path.to_string(),
                    language: Some(Language::Python),
                    size_bytes: 10,
                    modified_epoch: 0,
                    content_hash: hash.to_string(),
                    chunk_count: 1,
                })
                .collect(),
        )
    }

    #[test]
    fn test_diff_without_prior_marks_all_added() {
        let current = vec![discovered("a.py", "h1"), discovered("b.py", "h2")];
        let diff = compute_diff(None, &current);
        assert_eq!(diff.added.len(), 2);
        assert!(diff.removed.is_empty());
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_diff_classifies_added_changed_removed_unchanged() {
        let prior = status_with(&[("a.py", "h1"), ("b.py", "h2"), ("gone.py", "h3")]);
        let current = vec![
            discovered("a.py", "h1"),
            discovered("b.py", "CHANGED"),
            discovered("new.py", "h4"),
        ];
        let diff = compute_diff(Some(&prior), &current);
        assert_eq!(diff.unchanged, vec!["a.py"]);
        assert_eq!(diff.changed, vec!["b.py"]);
        assert_eq!(diff.added, vec!["new.py"]);
        assert_eq!(diff.removed, vec!["gone.py"]);
    }

    #[test]
    fn test_status_path_layout() {
        let path = status_path(Path::new("/repo"));
        assert_eq!(path, PathBuf::from("/repo/.deepwiki/index_status.json"));
    }
}
