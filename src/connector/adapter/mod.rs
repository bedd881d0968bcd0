mod anthropic_client;
mod cached_llm;
pub(crate) mod chunker;
mod duckdb_vector_store;
mod http_stream;
mod in_memory_vector_store;
mod mock_embedding;
mod mock_llm;
mod ollama_client;
mod openai_client;
mod openai_embedding;
mod ort_embedding;
mod retrying_llm;
pub(crate) mod treesitter_parser;

pub use anthropic_client::*;
pub use cached_llm::*;
pub use duckdb_vector_store::*;
pub use in_memory_vector_store::*;
pub use mock_embedding::*;
pub use mock_llm::*;
pub use ollama_client::*;
pub use openai_client::*;
pub use openai_embedding::*;
pub use ort_embedding::*;
pub use retrying_llm::*;
pub use treesitter_parser::TreeSitterParser;
