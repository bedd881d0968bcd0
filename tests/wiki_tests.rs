//! Wiki generation over an indexed temporary repository: full runs,
//! incremental reuse, and the emitted navigation artifacts.

use std::sync::Arc;

use tempfile::TempDir;

use deepwiki::application::use_cases::{IndexOptions, IndexRepositoryUseCase};
use deepwiki::application::wiki::{WikiGenerator, WikiOptions, WIKI_STATUS_FILE};
use deepwiki::application::VectorStore;
use deepwiki::connector::adapter::{
    InMemoryVectorStore, MockEmbedding, MockLlm, TreeSitterParser,
};
use deepwiki::domain::WikiGenerationStatus;

async fn indexed_repo(store: &Arc<InMemoryVectorStore>) -> TempDir {
    let dir = TempDir::new().unwrap();
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
    std::fs::write(
        dir.path().join("test_a.py"),
        "def test_nothing():\n    pass\n",
    )
    .unwrap();

    IndexRepositoryUseCase::new(
        Arc::new(TreeSitterParser::new()),
        Arc::new(MockEmbedding::new()),
        Arc::clone(store) as Arc<dyn VectorStore>,
    )
    .execute(dir.path(), IndexOptions::default())
    .await
    .unwrap();
    dir
}

fn generator(store: &Arc<InMemoryVectorStore>, llm: &Arc<MockLlm>) -> WikiGenerator {
    WikiGenerator::new(
        Arc::clone(store) as Arc<dyn VectorStore>,
        Arc::new(MockEmbedding::new()),
        Arc::clone(llm) as Arc<dyn deepwiki::application::LlmClient>,
    )
}

fn read_wiki_status(dir: &TempDir) -> WikiGenerationStatus {
    let raw = std::fs::read_to_string(dir.path().join(".deepwiki").join(WIKI_STATUS_FILE)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn full_run_writes_catalog_file_pages_and_navigation() {
    let store = Arc::new(InMemoryVectorStore::new());
    let dir = indexed_repo(&store).await;
    let llm = Arc::new(MockLlm::new());

    let summary = generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();

    let wiki = dir.path().join(".deepwiki");
    for page in [
        "index.md",
        "architecture.md",
        "dependencies.md",
        "inheritance.md",
        "coverage.md",
        "changelog.md",
        "glossary.md",
        "freshness.md",
        "files/a.py.md",
        "files/b.go.md",
    ] {
        assert!(wiki.join(page).is_file(), "missing page {}", page);
        assert!(summary.regenerated.contains(&page.to_string()));
    }

    // Test files get no documentation page.
    assert!(!wiki.join("files/test_a.py.md").exists());

    // Navigation artifacts.
    let toc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(wiki.join("toc.json")).unwrap()).unwrap();
    assert_eq!(toc["version"], 1);
    assert!(toc["sections"].as_array().unwrap().len() >= 8);

    let search: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(wiki.join("search.json")).unwrap()).unwrap();
    assert!(search.as_array().unwrap().len() >= 10);

    // Freshness is rendered mechanically, never via the LLM.
    let freshness = std::fs::read_to_string(wiki.join("freshness.md")).unwrap();
    assert!(freshness.contains("# Index Freshness"));
    assert!(freshness.contains("python: 2"));
}

#[tokio::test]
async fn unchanged_sources_reuse_every_page() {
    let store = Arc::new(InMemoryVectorStore::new());
    let dir = indexed_repo(&store).await;
    let llm = Arc::new(MockLlm::new());

    generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();
    let first_status = read_wiki_status(&dir);
    let calls_after_first = llm.call_count();

    // Touch mtimes without changing bytes, then re-index and regenerate.
    std::fs::write(
        dir.path().join("b.go"),
        include_str!("fixtures/sample_b.go"),
    )
    .unwrap();
    IndexRepositoryUseCase::new(
        Arc::new(TreeSitterParser::new()),
        Arc::new(MockEmbedding::new()),
        Arc::clone(&store) as Arc<dyn VectorStore>,
    )
    .execute(dir.path(), IndexOptions::default())
    .await
    .unwrap();

    let summary = generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();

    assert!(summary.regenerated.is_empty(), "no page should regenerate");
    assert!(!summary.reused.is_empty());
    assert_eq!(llm.call_count(), calls_after_first, "no further LLM calls");

    // Reused pages keep their content hashes.
    let second_status = read_wiki_status(&dir);
    for (path, page) in &first_status.pages {
        assert_eq!(
            second_status.pages[path].content_hash, page.content_hash,
            "content hash changed for {}",
            path
        );
    }
}

#[tokio::test]
async fn changed_file_regenerates_only_dependent_pages() {
    let store = Arc::new(InMemoryVectorStore::new());
    let dir = indexed_repo(&store).await;
    let llm = Arc::new(MockLlm::new());

    generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();

    // Change one file's bytes and re-index.
    std::fs::write(
        dir.path().join("b.go"),
        include_str!("fixtures/sample_b.go").replace("Greet", "Shout"),
    )
    .unwrap();
    IndexRepositoryUseCase::new(
        Arc::new(TreeSitterParser::new()),
        Arc::new(MockEmbedding::new()),
        Arc::clone(&store) as Arc<dyn VectorStore>,
    )
    .execute(dir.path(), IndexOptions::default())
    .await
    .unwrap();

    let summary = generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();

    // The changed file's page regenerates; the untouched file's page is
    // reused.
    assert!(summary.regenerated.contains(&"files/b.go.md".to_string()));
    assert!(summary.reused.contains(&"files/a.py.md".to_string()));
}

#[tokio::test]
async fn missing_page_file_forces_regeneration() {
    let store = Arc::new(InMemoryVectorStore::new());
    let dir = indexed_repo(&store).await;
    let llm = Arc::new(MockLlm::new());

    generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();

    std::fs::remove_file(dir.path().join(".deepwiki/files/a.py.md")).unwrap();

    let summary = generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await
        .unwrap();
    assert!(summary.regenerated.contains(&"files/a.py.md".to_string()));
}

#[tokio::test]
async fn unindexed_repo_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let llm = Arc::new(MockLlm::new());

    let result = generator(&store, &llm)
        .execute(dir.path(), WikiOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(deepwiki::domain::DomainError::NotIndexed(_))
    ));
}
