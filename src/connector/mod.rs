//! # Connector Layer
//!
//! External integrations implementing the application interfaces:
//! - Parsing (tree-sitter grammars + chunk emission)
//! - Vector storage (DuckDB with VSS, in-memory for tests)
//! - Embeddings (ONNX Runtime local model, OpenAI API, deterministic mock)
//! - LLM back-ends (Ollama, Anthropic, OpenAI) and their decorators
//!   (retry, similarity cache)

pub mod adapter;

pub use adapter::*;
