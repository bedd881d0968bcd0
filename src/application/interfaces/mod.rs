mod embedding_service;
mod llm_client;
mod parser_service;
mod vector_store;

pub use embedding_service::*;
pub use llm_client::*;
pub use parser_service::*;
pub use vector_store::*;
