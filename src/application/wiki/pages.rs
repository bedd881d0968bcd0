use crate::domain::ChunkKind;

/// A fixed catalog page: which store queries gather its contributing chunks
/// and what the LLM is asked to write.
pub struct CatalogPage {
    pub path: &'static str,
    pub title: &'static str,
    pub queries: &'static [&'static str],
    /// Optional chunk-kind filter applied to every gather query.
    pub kind_filter: Option<ChunkKind>,
    pub instructions: &'static str,
}

/// The generated catalog, in TOC order. `freshness.md` is not listed here:
/// it is rendered mechanically from the index status.
pub const CATALOG: &[CatalogPage] = &[
    CatalogPage {
        path: "index.md",
        title: "Overview",
        queries: &["main entry point", "core components", "public API surface"],
        kind_filter: None,
        instructions: "Write an overview of this repository: what it does, how it is \
            organized, and where a reader should start. Summarize the main components \
            and how they relate.",
    },
    CatalogPage {
        path: "architecture.md",
        title: "Architecture",
        queries: &["core components", "patterns", "data flow"],
        kind_filter: None,
        instructions: "Describe the architecture: the major components, the patterns \
            they follow, and how data flows between them. Call out the boundaries \
            between subsystems.",
    },
    CatalogPage {
        path: "dependencies.md",
        title: "Dependencies",
        queries: &["imports and external dependencies", "third party libraries"],
        kind_filter: Some(ChunkKind::Import),
        instructions: "Document the external dependencies: which libraries are imported \
            where, what each is used for, and which modules depend on which.",
    },
    CatalogPage {
        path: "inheritance.md",
        title: "Inheritance",
        queries: &["class hierarchy", "base classes and interfaces"],
        kind_filter: Some(ChunkKind::Class),
        instructions: "Document the type hierarchy: base classes, interfaces and their \
            implementors. Group related hierarchies together.",
    },
    CatalogPage {
        path: "coverage.md",
        title: "Documentation Coverage",
        queries: &["documented public functions", "classes and methods"],
        kind_filter: None,
        instructions: "Assess documentation coverage: which entities carry docstrings \
            and which public surfaces are undocumented. Point out the most important \
            gaps rather than listing everything.",
    },
    CatalogPage {
        path: "changelog.md",
        title: "Changelog",
        queries: &[],
        kind_filter: None,
        instructions: "Describe the most recently modified areas of the codebase based \
            on the module overviews below: what each touched module currently does. \
            Order by recency.",
    },
    CatalogPage {
        path: "glossary.md",
        title: "Glossary",
        queries: &["domain terminology", "core concepts and types"],
        kind_filter: None,
        instructions: "Produce a glossary of the domain terms and core entities used in \
            this codebase, one short definition each, alphabetically ordered.",
    },
];

pub const FRESHNESS_PAGE: &str = "freshness.md";

pub const FILE_PAGE_INSTRUCTIONS: &str = "Document this source file: its purpose, the \
    entities it defines, notable behavior, and how it fits into the wider codebase. \
    Preserve docstring information where present.";

/// Test sources are excluded from per-file documentation pages.
pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);

    lower.split('/').any(|part| {
        part == "tests" || part == "test" || part == "__tests__" || part == "testdata"
    }) || file_name.starts_with("test_")
        || file_name.contains("_test.")
        || file_name.contains(".test.")
        || file_name.contains(".spec.")
}
