//! Tool-handler surface consumed by the external request-dispatch façade:
//! one async handler per tool over a key/value argument map, with shared
//! input validation and a uniform error boundary.

pub mod tools;
pub mod validation;

pub use tools::*;
pub use validation::{resolve_wiki_page, ToolArgs};
