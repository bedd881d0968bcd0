//! Wiki generation: the fixed page catalog plus per-file pages, incremental
//! via per-page source hashes, post-processed by the cross-linker,
//! source-refs and see-also stages, with `toc.json` and `search.json`
//! emitted for navigation.

pub mod crosslink;
pub mod entity_registry;
pub mod generator;
pub mod pages;
pub mod search_index;
pub mod see_also;
pub mod source_refs;
pub mod toc;

pub use crosslink::{crosslink, page_for, relative_link};
pub use entity_registry::{EntityInfo, EntityRegistry};
pub use generator::{wiki_root, WikiGenerator, WikiOptions, WikiRunSummary, WIKI_STATUS_FILE};
pub use pages::is_test_file;
pub use search_index::{build_search_index, SearchEntry};
pub use see_also::append_see_also;
pub use source_refs::append_source_refs;
pub use toc::{build_toc, Toc, TocSection};
