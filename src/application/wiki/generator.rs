use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::use_cases::{load_status, ProgressCallback, DEEPWIKI_DIR};
use crate::application::wiki::crosslink::{crosslink, page_for};
use crate::application::wiki::entity_registry::EntityRegistry;
use crate::application::wiki::pages::{
    is_test_file, CatalogPage, CATALOG, FILE_PAGE_INSTRUCTIONS, FRESHNESS_PAGE,
};
use crate::application::wiki::search_index::build_search_index;
use crate::application::wiki::see_also::append_see_also;
use crate::application::wiki::source_refs::append_source_refs;
use crate::application::wiki::toc::build_toc;
use crate::application::{prompts, EmbeddingService, LlmClient, LlmRequest, VectorStore};
use crate::config;
use crate::domain::{
    page_content_hash, Chunk, ChunkKind, DomainError, IndexStatus, SearchQuery, SourceSpan,
    WikiGenerationStatus, WikiPageStatus,
};

pub const WIKI_STATUS_FILE: &str = "wiki_status.json";
const TOC_FILE: &str = "toc.json";
const SEARCH_FILE: &str = "search.json";
const PROMPT_EXCERPT_BUDGET: usize = 20_000;
const CHANGELOG_RECENT_FILES: usize = 10;
const WIKI_MAX_TOKENS: u32 = 2048;
const WIKI_TEMPERATURE: f32 = 0.2;

#[derive(Default, Clone)]
pub struct WikiOptions {
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct WikiRunSummary {
    pub regenerated: Vec<String>,
    pub reused: Vec<String>,
}

/// One planned page: contributing chunks and sources declared before any LLM
/// call, so incrementality is decided from hashes alone.
struct PagePlan {
    path: String,
    title: String,
    instructions: String,
    chunks: Vec<Chunk>,
    sources: BTreeMap<String, String>,
    spans: BTreeMap<String, SourceSpan>,
    /// Freshness is rendered without an LLM.
    mechanical_content: Option<String>,
}

/// Generates the wiki: fixed catalog pages plus one page per source file,
/// regenerating only pages whose contributing sources changed.
pub struct WikiGenerator {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingService>,
    llm: Arc<dyn LlmClient>,
}

impl WikiGenerator {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingService>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            store,
            embedder,
            llm,
        }
    }

    pub async fn execute(
        &self,
        repo_path: &Path,
        options: WikiOptions,
    ) -> Result<WikiRunSummary, DomainError> {
        let repo_path = repo_path
            .canonicalize()
            .map_err(|e| DomainError::invalid_input(format!("Invalid repository path: {}", e)))?;
        let start_time = Instant::now();

        let index_status = load_status(&repo_path).await?.ok_or_else(|| {
            DomainError::not_indexed(repo_path.to_string_lossy().to_string())
        })?;
        let wiki_root = wiki_root(&repo_path);
        tokio::fs::create_dir_all(&wiki_root).await?;

        let prior = load_wiki_status(&wiki_root).await?;

        // Inventory: every stored chunk, grouped by file, and the entity
        // registry built once for the whole run.
        let mut chunks_by_file: HashMap<String, Vec<Chunk>> = HashMap::new();
        for file in &index_status.files {
            let chunks = self.store.get_by_file(&file.path).await?;
            chunks_by_file.insert(file.path.clone(), chunks);
        }
        let registry = Arc::new(EntityRegistry::from_chunks(
            chunks_by_file.values().flatten(),
        ));
        debug!("Entity registry holds {} entities", registry.len());

        // Plan all pages up front; sources are declared before generation.
        if options.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        let mut plans = Vec::new();
        for page in CATALOG {
            plans.push(self.plan_catalog_page(page, &index_status, &chunks_by_file).await?);
        }
        plans.push(plan_freshness_page(&index_status));
        plans.extend(plan_file_pages(&index_status, &chunks_by_file));

        // Freshness depends on every file; letting it into the overlap map
        // would surface it in every page's See Also section.
        let sources_by_page: Arc<BTreeMap<String, BTreeSet<String>>> = Arc::new(
            plans
                .iter()
                .filter(|p| p.path != FRESHNESS_PAGE)
                .map(|p| (p.path.clone(), p.sources.keys().cloned().collect()))
                .collect(),
        );
        let titles_by_page: Arc<BTreeMap<String, String>> = Arc::new(
            plans
                .iter()
                .map(|p| (p.path.clone(), p.title.clone()))
                .collect(),
        );

        // Split the plan into pages to regenerate and pages to reuse.
        let mut to_generate = Vec::new();
        let mut reused = Vec::new();
        for plan in plans {
            let page_file = wiki_root.join(&plan.path);
            let exists = page_file.is_file();
            let needs = match prior.pages.get(&plan.path) {
                Some(status) => status.needs_regeneration(&plan.sources, exists),
                None => true,
            };
            if needs {
                to_generate.push(plan);
            } else {
                reused.push(plan.path.clone());
            }
        }
        info!(
            "Wiki plan: {} pages to regenerate, {} reused",
            to_generate.len(),
            reused.len()
        );

        // Generate concurrently under the LLM permit set. Per-page failures
        // are partial: the page is skipped and the run continues.
        let cfg = config::current();
        let semaphore = Arc::new(Semaphore::new(cfg.wiki.max_concurrent_llm_calls.max(1)));
        let total_pages = to_generate.len() as u64;
        let done = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let tasks = to_generate.into_iter().map(|plan| {
            let llm = Arc::clone(&self.llm);
            let registry = Arc::clone(&registry);
            let sources_by_page = Arc::clone(&sources_by_page);
            let titles_by_page = Arc::clone(&titles_by_page);
            let semaphore = Arc::clone(&semaphore);
            let cancel = options.cancel.clone();
            let progress = options.progress.clone();
            let done = Arc::clone(&done);
            let wiki_root = wiki_root.clone();

            async move {
                let result = generate_page(
                    plan,
                    llm,
                    registry,
                    sources_by_page,
                    titles_by_page,
                    semaphore,
                    cancel,
                    &wiki_root,
                )
                .await;
                if let Some(progress) = &progress {
                    let current = done.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                    let label = match &result {
                        Ok((path, _, _)) => path.clone(),
                        Err((path, _)) => path.clone(),
                    };
                    progress(&label, current, total_pages);
                }
                result
            }
        });

        let mut new_status = WikiGenerationStatus {
            index_status_hash: index_status.content_hash(),
            pages: BTreeMap::new(),
            generated_at_epoch: now_epoch(),
        };
        let mut generated_pages: Vec<(String, String, String)> = Vec::new();
        let mut summary = WikiRunSummary::default();

        for outcome in join_all(tasks).await {
            match outcome {
                Ok((path, content, status)) => {
                    let title = titles_by_page.get(&path).cloned().unwrap_or_else(|| path.clone());
                    generated_pages.push((path.clone(), title, content));
                    new_status.record(status);
                    summary.regenerated.push(path);
                }
                Err((_, e)) if e.is_cancellation() => return Err(e),
                Err((path, e)) => {
                    warn!("Page {} failed and was skipped: {}", path, e);
                    // Keep the previous status so the next run retries it
                    // only when sources change again or the page is missing.
                    if let Some(old) = prior.pages.get(&path) {
                        new_status.record(old.clone());
                    }
                }
            }
        }

        // Reused pages keep their prior status; their content still feeds the
        // search index.
        for path in &reused {
            if let Some(old) = prior.pages.get(path) {
                new_status.record(old.clone());
            }
            let title = titles_by_page.get(path).cloned().unwrap_or_else(|| path.clone());
            match tokio::fs::read_to_string(wiki_root.join(path)).await {
                Ok(content) => generated_pages.push((path.clone(), title, content)),
                Err(e) => warn!("Could not read reused page {}: {}", path, e),
            }
        }
        summary.reused = reused;

        self.write_navigation(&wiki_root, &generated_pages).await?;
        save_wiki_status(&wiki_root, &new_status).await?;

        info!(
            "Wiki generation complete: {} regenerated, {} reused in {:.2}s",
            summary.regenerated.len(),
            summary.reused.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    /// Gather a catalog page's contributing chunks via store searches.
    async fn plan_catalog_page(
        &self,
        page: &CatalogPage,
        index_status: &IndexStatus,
        chunks_by_file: &HashMap<String, Vec<Chunk>>,
    ) -> Result<PagePlan, DomainError> {
        let cfg = config::current();

        let mut gathered: Vec<Chunk> = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        if page.path == "changelog.md" {
            // The changelog draws from the most recently modified files'
            // module overviews rather than semantic queries.
            let mut files: Vec<_> = index_status.files.iter().collect();
            files.sort_by(|a, b| b.modified_epoch.cmp(&a.modified_epoch));
            for file in files.into_iter().take(CHANGELOG_RECENT_FILES) {
                let modules = chunks_by_file
                    .get(&file.path)
                    .into_iter()
                    .flatten()
                    .filter(|c| c.kind() == ChunkKind::Module);
                for chunk in modules {
                    if seen.insert(chunk.id().to_string()) {
                        gathered.push(chunk.clone());
                    }
                }
            }
        } else {
            let limit = if page.kind_filter == Some(ChunkKind::Import) {
                cfg.wiki.import_search_limit
            } else {
                cfg.wiki.context_search_limit
            };

            // All gather queries for a page run in parallel; the page's LLM
            // call starts only after every read completes.
            let searches = page.queries.iter().map(|q| {
                let store = Arc::clone(&self.store);
                let embedder = Arc::clone(&self.embedder);
                let mut query = SearchQuery::new(*q).with_limit(limit);
                if let Some(kind) = page.kind_filter {
                    query = query.with_kind(kind);
                }
                async move {
                    let vector = embedder.embed_query(query.query()).await?;
                    store.search(&vector, &query).await
                }
            });
            for outcome in join_all(searches).await {
                match outcome {
                    Ok(results) => {
                        for result in results {
                            if seen.insert(result.chunk().id().to_string()) {
                                gathered.push(result.into_chunk());
                            }
                        }
                    }
                    Err(e) => warn!("Gather query for {} failed: {}", page.path, e),
                }
            }

            if gathered.is_empty() {
                let vector = self.embedder.embed_query(page.title).await?;
                let results = self
                    .store
                    .search(
                        &vector,
                        &SearchQuery::new(page.title)
                            .with_limit(cfg.wiki.fallback_search_limit),
                    )
                    .await?;
                for result in results {
                    if seen.insert(result.chunk().id().to_string()) {
                        gathered.push(result.into_chunk());
                    }
                }
            }
        }

        let sources = sources_of(&gathered, index_status);
        Ok(PagePlan {
            path: page.path.to_string(),
            title: page.title.to_string(),
            instructions: page.instructions.to_string(),
            chunks: gathered,
            sources,
            spans: BTreeMap::new(),
            mechanical_content: None,
        })
    }

    async fn write_navigation(
        &self,
        wiki_root: &Path,
        pages: &[(String, String, String)],
    ) -> Result<(), DomainError> {
        let mut catalog: Vec<(String, String)> = Vec::new();
        let mut file_pages: Vec<String> = Vec::new();
        for (path, title, _) in pages {
            if path.starts_with("files/") {
                file_pages.push(path.clone());
            } else {
                catalog.push((path.clone(), title.clone()));
            }
        }
        // Stable catalog order regardless of generation order.
        let order: Vec<&str> = CATALOG
            .iter()
            .map(|p| p.path)
            .chain([FRESHNESS_PAGE])
            .collect();
        catalog.sort_by_key(|(path, _)| {
            order
                .iter()
                .position(|p| *p == path.as_str())
                .unwrap_or(usize::MAX)
        });

        let toc = build_toc(&catalog, &file_pages);
        let toc_json = serde_json::to_string_pretty(&toc)
            .map_err(|e| DomainError::internal(format!("Failed to serialize TOC: {}", e)))?;
        tokio::fs::write(wiki_root.join(TOC_FILE), toc_json).await?;

        let search = build_search_index(pages);
        let search_json = serde_json::to_string_pretty(&search)
            .map_err(|e| DomainError::internal(format!("Failed to serialize search index: {}", e)))?;
        tokio::fs::write(wiki_root.join(SEARCH_FILE), search_json).await?;
        Ok(())
    }
}

/// Generate one page end to end: LLM (or mechanical render), then the fixed
/// post-processor order cross-link → source-refs → see-also, then write.
#[allow(clippy::too_many_arguments)]
async fn generate_page(
    plan: PagePlan,
    llm: Arc<dyn LlmClient>,
    registry: Arc<EntityRegistry>,
    sources_by_page: Arc<BTreeMap<String, BTreeSet<String>>>,
    titles_by_page: Arc<BTreeMap<String, String>>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    wiki_root: &Path,
) -> Result<(String, String, WikiPageStatus), (String, DomainError)> {
    let path = plan.path.clone();
    let fail = |e: DomainError| (path.clone(), e);

    let raw = match &plan.mechanical_content {
        Some(content) => content.clone(),
        None => {
            let permit = semaphore
                .acquire()
                .await
                .map_err(|_| fail(DomainError::internal("LLM permit set closed")))?;
            if cancel.is_cancelled() {
                return Err(fail(DomainError::Cancelled));
            }

            let cfg = config::current();
            let prompt_set = cfg.prompts.for_provider(llm.name());
            let request = LlmRequest::new(build_prompt(&plan))
                .with_system(prompts::wiki_system(prompt_set).to_string())
                .with_max_tokens(WIKI_MAX_TOKENS)
                .with_temperature(WIKI_TEMPERATURE);

            let response = llm.generate(&request).await.map_err(&fail)?;
            drop(permit);
            ensure_title(response, &plan.title)
        }
    };

    let linked = crosslink(&raw, &registry, &plan.path);
    let chunk_refs: Vec<&Chunk> = plan.chunks.iter().collect();
    let with_refs = append_source_refs(&linked, &chunk_refs);
    let content = append_see_also(&with_refs, &plan.path, &sources_by_page, &titles_by_page);

    let page_file = wiki_root.join(&plan.path);
    if let Some(parent) = page_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| fail(e.into()))?;
    }
    tokio::fs::write(&page_file, &content)
        .await
        .map_err(|e| fail(e.into()))?;

    let status = WikiPageStatus::new(
        plan.path.clone(),
        plan.sources,
        page_content_hash(&content),
        now_epoch(),
    )
    .with_spans(plan.spans);

    Ok((plan.path, content, status))
}

fn build_prompt(plan: &PagePlan) -> String {
    let mut excerpts = String::new();
    for chunk in &plan.chunks {
        if excerpts.len() > PROMPT_EXCERPT_BUDGET {
            break;
        }
        excerpts.push_str(&format!(
            "--- {} ({} {}) ---\n",
            chunk.location(),
            chunk.kind(),
            chunk.name().unwrap_or("unnamed"),
        ));
        if let Some(doc) = chunk.docstring() {
            excerpts.push_str("Doc: ");
            excerpts.push_str(doc);
            excerpts.push('\n');
        }
        excerpts.push_str(chunk.content());
        excerpts.push_str("\n\n");
    }

    format!(
        "{}\n\nCode excerpts:\n\n{}\nWrite the '{}' page in markdown, starting with '# {}'.",
        plan.instructions, excerpts, plan.title, plan.title
    )
}

fn ensure_title(content: String, title: &str) -> String {
    if content.trim_start().starts_with('#') {
        content
    } else {
        format!("# {}\n\n{}", title, content)
    }
}

fn plan_freshness_page(index_status: &IndexStatus) -> PagePlan {
    let mut content = format!(
        "# Index Freshness\n\nIndexed at epoch {} covering {} files and {} chunks.\n\n## Files by language\n\n",
        index_status.indexed_at_epoch, index_status.total_files, index_status.total_chunks
    );
    for (language, count) in &index_status.files_by_language {
        content.push_str(&format!("- {}: {}\n", language, count));
    }

    let mut recent: Vec<_> = index_status.files.iter().collect();
    recent.sort_by(|a, b| b.modified_epoch.cmp(&a.modified_epoch));
    content.push_str("\n## Most recently modified\n\n");
    for file in recent.iter().take(15) {
        content.push_str(&format!("- `{}` (epoch {})\n", file.path, file.modified_epoch));
    }

    PagePlan {
        path: FRESHNESS_PAGE.to_string(),
        title: "Index Freshness".to_string(),
        instructions: String::new(),
        chunks: Vec::new(),
        sources: index_status
            .files
            .iter()
            .map(|f| (f.path.clone(), f.content_hash.clone()))
            .collect(),
        spans: BTreeMap::new(),
        mechanical_content: Some(content),
    }
}

fn plan_file_pages(
    index_status: &IndexStatus,
    chunks_by_file: &HashMap<String, Vec<Chunk>>,
) -> Vec<PagePlan> {
    let max_file_docs = config::current().wiki.max_file_docs;

    let mut eligible: Vec<_> = index_status
        .files
        .iter()
        .filter(|f| !is_test_file(&f.path))
        .collect();
    if eligible.len() > max_file_docs {
        // The largest files win the page budget.
        eligible.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        eligible.truncate(max_file_docs);
    }
    eligible.sort_by(|a, b| a.path.cmp(&b.path));

    eligible
        .into_iter()
        .map(|file| {
            let chunks = chunks_by_file.get(&file.path).cloned().unwrap_or_default();
            let span = SourceSpan {
                start_line: chunks.iter().map(|c| c.start_line()).min().unwrap_or(1),
                end_line: chunks.iter().map(|c| c.end_line()).max().unwrap_or(1),
            };
            PagePlan {
                path: page_for(&file.path),
                title: file.path.clone(),
                instructions: FILE_PAGE_INSTRUCTIONS.to_string(),
                chunks,
                sources: [(file.path.clone(), file.content_hash.clone())].into(),
                spans: [(file.path.clone(), span)].into(),
                mechanical_content: None,
            }
        })
        .collect()
}

fn sources_of(chunks: &[Chunk], index_status: &IndexStatus) -> BTreeMap<String, String> {
    let hashes: HashMap<&str, &str> = index_status
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.content_hash.as_str()))
        .collect();
    chunks
        .iter()
        .filter_map(|c| {
            hashes
                .get(c.file_path())
                .map(|h| (c.file_path().to_string(), h.to_string()))
        })
        .collect()
}

pub fn wiki_root(repo_path: &Path) -> PathBuf {
    let base = repo_path.join(DEEPWIKI_DIR);
    let configured = config::current().output.wiki_dir.clone();
    if configured == "." || configured.is_empty() {
        base
    } else {
        base.join(configured)
    }
}

async fn load_wiki_status(wiki_root: &Path) -> Result<WikiGenerationStatus, DomainError> {
    let path = wiki_root.join(WIKI_STATUS_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| DomainError::store(format!("Corrupt wiki status: {}", e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WikiGenerationStatus::default()),
        Err(e) => Err(DomainError::store(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

async fn save_wiki_status(
    wiki_root: &Path,
    status: &WikiGenerationStatus,
) -> Result<(), DomainError> {
    let raw = serde_json::to_string_pretty(status)
        .map_err(|e| DomainError::store(format!("Failed to serialize wiki status: {}", e)))?;
    tokio::fs::write(wiki_root.join(WIKI_STATUS_FILE), raw).await?;
    Ok(())
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
