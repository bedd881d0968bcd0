use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Index a repository and generate its wiki
    Index {
        path: String,

        /// Restrict to these languages (comma-separated)
        #[arg(short = 'L', long)]
        languages: Option<String>,

        /// Ignore the previous index and rebuild everything
        #[arg(short, long)]
        full_rebuild: bool,

        /// Skip wiki generation after indexing
        #[arg(long)]
        no_wiki: bool,
    },

    /// Ask a single question answered from one retrieval pass
    Ask {
        path: String,
        question: String,

        /// Context chunks for the answer (1-20)
        #[arg(long, default_value = "5")]
        max_context: usize,
    },

    /// Run multi-step research with streamed progress
    Research {
        path: String,
        question: String,

        /// Preset profile: quick, default, or thorough
        #[arg(short, long, default_value = "default")]
        preset: String,

        /// Override the global retrieved-chunk cap
        #[arg(long)]
        max_chunks: Option<usize>,
    },

    /// Regenerate the wiki for an already-indexed repository
    Wiki {
        path: String,
    },

    /// Semantic code search
    Search {
        path: String,
        query: String,

        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(short = 'L', long)]
        language: Option<String>,
    },
}
