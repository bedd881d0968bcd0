//! # DeepWiki
//!
//! A queryable, semantically-indexed knowledge base built from a source-code
//! repository: an incremental vector index of semantic code chunks, an
//! LLM-generated wiki derived from those chunks, and a multi-step research
//! pipeline that answers questions with citations.
//!
//! ## Architecture
//!
//! - `domain`: core models and the error taxonomy
//! - `application`: interfaces, use cases (indexing, search, research), the
//!   wiki generator, and the tool-handler façade
//! - `connector`: external integrations (tree-sitter, DuckDB, ONNX
//!   embeddings, LLM back-ends)
//! - `config`: YAML-backed process configuration with a task-scoped test
//!   override

pub mod application;
pub mod config;
pub mod connector;
pub mod domain;

// Re-export commonly used types
pub use application::*;
pub use connector::*;
pub use domain::*;
