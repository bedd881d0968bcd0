//! End-to-end indexing over a real temporary repository: fresh runs,
//! incremental hash-diff runs, and status persistence.

use std::collections::HashMap;
use std::sync::Arc;

use tempfile::TempDir;

use deepwiki::application::use_cases::{
    load_status, IndexOptions, IndexRepositoryUseCase,
};
use deepwiki::application::VectorStore;
use deepwiki::connector::adapter::{InMemoryVectorStore, MockEmbedding, TreeSitterParser};
use deepwiki::domain::{Chunk, ChunkKind};

fn write_repo(dir: &TempDir) {
    std::fs::write(
        dir.path().join("a.py"),
        include_str!("fixtures/sample_a.py"),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("b.go"),
        include_str!("fixtures/sample_b.go"),
    )
    .unwrap();
}

fn use_case(store: &Arc<InMemoryVectorStore>) -> IndexRepositoryUseCase {
    IndexRepositoryUseCase::new(
        Arc::new(TreeSitterParser::new()),
        Arc::new(MockEmbedding::new()),
        Arc::clone(store) as Arc<dyn VectorStore>,
    )
}

async fn chunks_by_file(store: &InMemoryVectorStore) -> HashMap<String, Vec<Chunk>> {
    let mut out = HashMap::new();
    for file in store.list_files().await.unwrap() {
        let chunks = store.get_by_file(&file).await.unwrap();
        out.insert(file, chunks);
    }
    out
}

fn count_kinds(chunks: &[Chunk], kind: ChunkKind) -> usize {
    chunks.iter().filter(|c| c.kind() == kind).count()
}

#[tokio::test]
async fn fresh_index_produces_expected_chunk_inventory() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);

    let store = Arc::new(InMemoryVectorStore::new());
    let status = use_case(&store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(status.total_files, 2);
    assert_eq!(status.files_by_language.get("python"), Some(&1));
    assert_eq!(status.files_by_language.get("go"), Some(&1));

    let by_file = chunks_by_file(&store).await;

    // a.py: the class exceeds the split threshold, so it becomes a summary
    // chunk plus one chunk per method.
    let py = &by_file["a.py"];
    assert_eq!(count_kinds(py, ChunkKind::Module), 1);
    assert_eq!(count_kinds(py, ChunkKind::Import), 1);
    assert_eq!(count_kinds(py, ChunkKind::Class), 1);
    assert_eq!(count_kinds(py, ChunkKind::Method), 2);
    assert_eq!(count_kinds(py, ChunkKind::Function), 1);

    let class_chunk = py.iter().find(|c| c.kind() == ChunkKind::Class).unwrap();
    assert!(class_chunk.is_summary());
    assert!(class_chunk.content().contains("# Methods: load, save"));

    // b.go: module + one documented function, no imports.
    let go = &by_file["b.go"];
    assert_eq!(go.len(), 2);
    assert_eq!(count_kinds(go, ChunkKind::Module), 1);
    assert_eq!(count_kinds(go, ChunkKind::Function), 1);

    let greet = go.iter().find(|c| c.kind() == ChunkKind::Function).unwrap();
    assert_eq!(greet.name(), Some("Greet"));
    assert_eq!(
        greet.docstring(),
        Some("Greet returns a friendly greeting for name.")
    );
}

#[tokio::test]
async fn incremental_run_touches_only_changed_files() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);

    let store = Arc::new(InMemoryVectorStore::new());
    use_case(&store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    let before = chunks_by_file(&store).await;
    let py_ids_before: Vec<String> = before["a.py"].iter().map(|c| c.id().to_string()).collect();
    let go_ids_before: Vec<String> = before["b.go"].iter().map(|c| c.id().to_string()).collect();

    // Rename the Go function; a.py is untouched.
    std::fs::write(
        dir.path().join("b.go"),
        include_str!("fixtures/sample_b.go").replace("Greet", "Shout"),
    )
    .unwrap();

    use_case(&store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    let after = chunks_by_file(&store).await;
    let py_ids_after: Vec<String> = after["a.py"].iter().map(|c| c.id().to_string()).collect();
    let go_ids_after: Vec<String> = after["b.go"].iter().map(|c| c.id().to_string()).collect();

    assert_eq!(py_ids_before, py_ids_after, "unchanged file keeps its ids");
    assert_ne!(go_ids_before, go_ids_after, "edited file is re-chunked");
    assert!(after["b.go"]
        .iter()
        .any(|c| c.name() == Some("Shout")));
    assert!(!after["b.go"].iter().any(|c| c.name() == Some("Greet")));
}

#[tokio::test]
async fn rerun_without_changes_is_equivalent_to_fresh_index() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);

    let fresh_store = Arc::new(InMemoryVectorStore::new());
    use_case(&fresh_store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();
    let fresh = chunks_by_file(&fresh_store).await;

    let incremental_store = Arc::new(InMemoryVectorStore::new());
    let use_case_incremental = use_case(&incremental_store);
    use_case_incremental
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();
    use_case_incremental
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();
    let rerun = chunks_by_file(&incremental_store).await;

    let ids = |m: &HashMap<String, Vec<Chunk>>| -> Vec<String> {
        let mut all: Vec<String> = m
            .values()
            .flatten()
            .map(|c| c.id().to_string())
            .collect();
        all.sort();
        all
    };
    assert_eq!(ids(&fresh), ids(&rerun));
}

#[tokio::test]
async fn deleted_files_are_purged_from_the_store() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);

    let store = Arc::new(InMemoryVectorStore::new());
    let indexer = use_case(&store);
    indexer
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    std::fs::remove_file(dir.path().join("b.go")).unwrap();
    let status = indexer
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(status.total_files, 1);
    assert_eq!(store.list_files().await.unwrap(), vec!["a.py".to_string()]);
}

#[tokio::test]
async fn status_is_persisted_and_reloaded() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);

    let store = Arc::new(InMemoryVectorStore::new());
    let status = use_case(&store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    assert!(dir.path().join(".deepwiki/index_status.json").is_file());

    let reloaded = load_status(dir.path()).await.unwrap().unwrap();
    assert_eq!(reloaded.total_files, status.total_files);
    assert_eq!(reloaded.content_hash(), status.content_hash());
}

#[tokio::test]
async fn oversized_and_unsupported_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_repo(&dir);
    std::fs::write(dir.path().join("notes.txt"), "not code").unwrap();
    // Larger than the 1 MB default ceiling.
    std::fs::write(dir.path().join("huge.py"), "x = 1\n".repeat(300_000)).unwrap();

    let store = Arc::new(InMemoryVectorStore::new());
    let status = use_case(&store)
        .execute(dir.path(), IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(status.total_files, 2);
    let files = store.list_files().await.unwrap();
    assert!(!files.contains(&"notes.txt".to_string()));
    assert!(!files.contains(&"huge.py".to_string()));
}
