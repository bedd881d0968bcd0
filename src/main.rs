//! DeepWiki CLI - semantic code knowledge base.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use deepwiki::application::use_cases::{
    AskQuestionUseCase, DeepResearchUseCase, IndexOptions, IndexRepositoryUseCase,
    ResearchOptions, SearchCodeUseCase,
};
use deepwiki::application::wiki::{WikiGenerator, WikiOptions};
use deepwiki::application::{EmbeddingService, LlmClient};
use deepwiki::config::{self, Config, DeepResearchConfig};
use deepwiki::connector::adapter::{
    AnthropicClient, CachedLlm, DuckdbVectorStore, OllamaClient, OpenAiClient, OpenAiEmbedding,
    OrtEmbedding, RetryingLlm, TreeSitterParser,
};
use deepwiki::domain::{Language, SearchQuery};

mod cli;
use cli::Commands;

/// DeepWiki - repository knowledge base with semantic search, an LLM wiki,
/// and multi-step research
#[derive(Parser)]
#[command(name = "deepwiki")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // DEEPWIKI_LOG overrides the default level; --verbose bumps it.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("DEEPWIKI_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_file = cli.config.or_else(|| {
        let default = PathBuf::from("deepwiki.yaml");
        default.exists().then_some(default)
    });
    let loaded = match config_file {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    loaded.validate()?;
    let cfg = config::init(loaded);

    let parser = Arc::new(TreeSitterParser::new());
    let embedder = build_embedder(&cfg)?;

    match cli.command {
        Commands::Index {
            path,
            languages,
            full_rebuild,
            no_wiki,
        } => {
            let languages = parse_languages(languages.as_deref())?;
            let store = open_store(Path::new(&path), embedder.config().dimensions()).await?;

            let bar = progress_bar();
            let bar_for_callback = bar.clone();
            let indexer = IndexRepositoryUseCase::new(
                parser,
                Arc::clone(&embedder),
                Arc::clone(&store) as Arc<dyn deepwiki::application::VectorStore>,
            );
            let status = indexer
                .execute(
                    Path::new(&path),
                    IndexOptions {
                        languages,
                        full_rebuild,
                        progress: Some(Arc::new(move |message, current, total| {
                            bar_for_callback.set_length(total);
                            bar_for_callback.set_position(current);
                            bar_for_callback.set_message(message.to_string());
                        })),
                        ..Default::default()
                    },
                )
                .await?;
            bar.finish_and_clear();
            println!(
                "Indexed {} files, {} chunks.",
                status.total_files, status.total_chunks
            );

            if !no_wiki {
                let llm = build_llm(&cfg, &embedder, &store).await?;
                let generator = WikiGenerator::new(store, embedder, llm);
                let summary = generator
                    .execute(Path::new(&path), WikiOptions::default())
                    .await?;
                println!(
                    "Wiki: {} pages regenerated, {} reused.",
                    summary.regenerated.len(),
                    summary.reused.len()
                );
            }
        }

        Commands::Ask {
            path,
            question,
            max_context,
        } => {
            let store = open_store(Path::new(&path), embedder.config().dimensions()).await?;
            let llm = build_llm(&cfg, &embedder, &store).await?;
            let use_case = AskQuestionUseCase::new(store, embedder, llm);
            let answer = use_case
                .execute(&question, max_context.clamp(1, 20))
                .await?;

            println!("{}\n", answer.answer);
            if !answer.sources.is_empty() {
                println!("Sources:");
                for source in &answer.sources {
                    println!("  {}", source.citation());
                }
            }
        }

        Commands::Research {
            path,
            question,
            preset,
            max_chunks,
        } => {
            let mut research_config = DeepResearchConfig::preset(&preset)
                .ok_or_else(|| anyhow::anyhow!("Unknown preset '{}'", preset))?;
            if let Some(max_chunks) = max_chunks {
                research_config.max_total_chunks = max_chunks.clamp(1, 200);
            }

            let store = open_store(Path::new(&path), embedder.config().dimensions()).await?;
            let llm = build_llm(&cfg, &embedder, &store).await?;
            let use_case = DeepResearchUseCase::new(store, embedder, llm);

            let (tx, mut rx) = tokio::sync::mpsc::channel::<deepwiki::domain::ResearchProgress>(16);
            let printer = tokio::spawn(async move {
                while let Some(progress) = rx.recv().await {
                    eprintln!(
                        "[{}/{}] {}",
                        progress.step, progress.total_steps, progress.message
                    );
                }
            });

            let result = use_case
                .execute(
                    &question,
                    ResearchOptions {
                        config: Some(research_config),
                        progress: Some(tx),
                        ..Default::default()
                    },
                )
                .await?;
            let _ = printer.await;

            println!("{}\n", result.answer);
            println!(
                "({} chunks analyzed, {} LLM calls)",
                result.chunks_analyzed, result.llm_calls
            );
            if !result.sources.is_empty() {
                println!("Sources:");
                for source in result.sources.iter().take(10) {
                    println!("  {} (score {:.3})", source.citation(), source.score);
                }
            }
        }

        Commands::Wiki { path } => {
            let store = open_store(Path::new(&path), embedder.config().dimensions()).await?;
            let llm = build_llm(&cfg, &embedder, &store).await?;
            let generator = WikiGenerator::new(store, embedder, llm);
            let summary = generator
                .execute(Path::new(&path), WikiOptions::default())
                .await?;
            println!(
                "Wiki: {} pages regenerated, {} reused.",
                summary.regenerated.len(),
                summary.reused.len()
            );
        }

        Commands::Search {
            path,
            query,
            limit,
            language,
        } => {
            let store = open_store(Path::new(&path), embedder.config().dimensions()).await?;
            let use_case = SearchCodeUseCase::new(store, embedder);

            let mut search_query = SearchQuery::new(&query).with_limit(limit);
            if let Some(raw) = language {
                let language = Language::parse_strict(&raw)
                    .ok_or_else(|| anyhow::anyhow!("Unknown language '{}'", raw))?;
                search_query = search_query.with_language(language);
            }

            let results = use_case.execute(search_query).await?;
            if results.is_empty() {
                println!("No results found.");
            } else {
                for (i, result) in results.iter().enumerate() {
                    println!("{}. {}", i + 1, result.display_line());
                    if let Some(name) = result.chunk().name() {
                        println!("   {} ({})", name, result.chunk().kind());
                    }
                    for line in result.chunk().content().lines().take(3) {
                        println!("   | {}", line);
                    }
                    println!();
                }
            }
        }
    }

    Ok(())
}

fn build_embedder(cfg: &Config) -> Result<Arc<dyn EmbeddingService>> {
    match cfg.embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedding::from_env(Some(
            &cfg.embedding.openai.model,
        ))?)),
        _ => Ok(Arc::new(OrtEmbedding::new(Some(&cfg.embedding.local.model))?)),
    }
}

/// Base provider per config, wrapped in retry, then in the similarity cache
/// persisted alongside the repository's vector table.
async fn build_llm(
    cfg: &Config,
    embedder: &Arc<dyn EmbeddingService>,
    store: &Arc<DuckdbVectorStore>,
) -> Result<Arc<dyn LlmClient>> {
    let base: Arc<dyn LlmClient> = match cfg.llm.provider.as_str() {
        "anthropic" => Arc::new(AnthropicClient::from_env(cfg.llm.anthropic.model.clone())?),
        "openai" => Arc::new(OpenAiClient::from_env(cfg.llm.openai.model.clone())?),
        _ => Arc::new(OllamaClient::new(
            cfg.llm.ollama.model.clone(),
            cfg.llm.ollama.base_url.clone(),
        )),
    };
    let retrying: Arc<dyn LlmClient> = Arc::new(RetryingLlm::new(base));

    let cached = CachedLlm::new(retrying, cfg.llm_cache.clone())
        .with_embedder(Arc::clone(embedder))
        .with_persistence(store.shared_connection())
        .await?;
    Ok(Arc::new(cached))
}

async fn open_store(repo_path: &Path, dimensions: usize) -> Result<Arc<DuckdbVectorStore>> {
    let db_dir = repo_path.join(".deepwiki");
    tokio::fs::create_dir_all(&db_dir).await?;
    let db_path = db_dir.join(&config::current().output.vector_db_name);
    let store =
        tokio::task::spawn_blocking(move || DuckdbVectorStore::new(&db_path, dimensions)).await??;
    Ok(Arc::new(store))
}

fn parse_languages(raw: Option<&str>) -> Result<Option<Vec<Language>>> {
    let Some(raw) = raw else { return Ok(None) };
    let mut languages = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        languages.push(
            Language::parse_strict(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown language '{}'", name))?,
        );
    }
    Ok((!languages.is_empty()).then_some(languages))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
            .expect("Invalid progress bar template")
            .progress_chars("━━─"),
    );
    bar
}
