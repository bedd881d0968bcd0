//! Shared argument validation for the tool handlers. Every rule funnels into
//! `DomainError::InvalidInput` so the uniform catch can surface the message
//! verbatim.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::domain::{ChunkKind, DomainError, Language};

pub type ToolArgs = HashMap<String, Value>;

pub fn require_str(args: &ToolArgs, key: &str) -> Result<String, DomainError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must not be empty",
            key
        ))),
        Some(_) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must be a string",
            key
        ))),
        None => Err(DomainError::invalid_input(format!(
            "Missing required argument '{}'",
            key
        ))),
    }
}

pub fn optional_str(args: &ToolArgs, key: &str) -> Result<Option<String>, DomainError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must be a string",
            key
        ))),
    }
}

pub fn optional_bool(args: &ToolArgs, key: &str) -> Result<bool, DomainError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must be a boolean",
            key
        ))),
    }
}

/// Integer argument clamped into `[min, max]`, defaulting when absent.
pub fn clamped_int(
    args: &ToolArgs,
    key: &str,
    min: usize,
    max: usize,
    default: usize,
) -> Result<usize, DomainError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => {
            let value = n.as_i64().ok_or_else(|| {
                DomainError::invalid_input(format!("Argument '{}' must be an integer", key))
            })?;
            let value = value.max(0) as usize;
            Ok(value.clamp(min, max))
        }
        Some(_) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must be an integer",
            key
        ))),
    }
}

pub fn optional_language(args: &ToolArgs, key: &str) -> Result<Option<Language>, DomainError> {
    match optional_str(args, key)? {
        None => Ok(None),
        Some(raw) => Language::parse_strict(&raw).map(Some).ok_or_else(|| {
            DomainError::invalid_input(format!("Unknown language '{}'", raw))
        }),
    }
}

#[allow(dead_code)]
pub fn optional_chunk_kind(args: &ToolArgs, key: &str) -> Result<Option<ChunkKind>, DomainError> {
    match optional_str(args, key)? {
        None => Ok(None),
        Some(raw) => ChunkKind::parse_strict(&raw).map(Some).ok_or_else(|| {
            DomainError::invalid_input(format!("Unknown chunk type '{}'", raw))
        }),
    }
}

/// A `languages` argument: a JSON array of names or one comma-separated
/// string, every element a declared language name.
pub fn optional_languages(
    args: &ToolArgs,
    key: &str,
) -> Result<Option<Vec<Language>>, DomainError> {
    let names: Vec<String> = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                _ => Err(DomainError::invalid_input(format!(
                    "Argument '{}' must contain only strings",
                    key
                ))),
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(DomainError::invalid_input(format!(
                "Argument '{}' must be a string or array of strings",
                key
            )))
        }
    };

    let mut languages = Vec::new();
    for name in names.iter().filter(|n| !n.is_empty()) {
        languages.push(Language::parse_strict(name).ok_or_else(|| {
            DomainError::invalid_input(format!("Unknown language '{}'", name))
        })?);
    }
    Ok((!languages.is_empty()).then_some(languages))
}

/// An enum-valued argument that must equal one of `allowed`.
pub fn optional_enum(
    args: &ToolArgs,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, DomainError> {
    match optional_str(args, key)? {
        None => Ok(None),
        Some(raw) if allowed.contains(&raw.as_str()) => Ok(Some(raw)),
        Some(raw) => Err(DomainError::invalid_input(format!(
            "Argument '{}' must be one of {:?}, got '{}'",
            key, allowed, raw
        ))),
    }
}

/// Resolve `page` under `wiki_path`, rejecting any path that escapes it.
pub fn resolve_wiki_page(wiki_path: &Path, page: &str) -> Result<PathBuf, DomainError> {
    if page.trim().is_empty() {
        return Err(DomainError::invalid_input("Argument 'page' must not be empty"));
    }
    let candidate = Path::new(page);
    if candidate.is_absolute() {
        return Err(DomainError::invalid_input(
            "Argument 'page' must be relative to the wiki root",
        ));
    }
    if candidate
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(DomainError::invalid_input(
            "Argument 'page' must not contain '..'",
        ));
    }

    let wiki_root = wiki_path
        .canonicalize()
        .map_err(|e| DomainError::invalid_input(format!("Invalid wiki path: {}", e)))?;
    let resolved = wiki_root.join(candidate);

    // Symlinks inside the wiki could still escape; canonicalize the final
    // path and re-check containment.
    let resolved = resolved
        .canonicalize()
        .map_err(|e| DomainError::invalid_input(format!("Unknown page '{}': {}", page, e)))?;
    if !resolved.starts_with(&wiki_root) {
        return Err(DomainError::invalid_input(format!(
            "Page '{}' escapes the wiki root",
            page
        )));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_require_str() {
        let a = args(&[("repo_path", Value::String("/repo".into()))]);
        assert_eq!(require_str(&a, "repo_path").unwrap(), "/repo");
        assert!(require_str(&a, "missing").is_err());
        assert!(require_str(&args(&[("x", Value::from(3))]), "x").is_err());
        assert!(require_str(&args(&[("x", Value::String("  ".into()))]), "x").is_err());
    }

    #[test]
    fn test_clamped_int_bounds_and_default() {
        let empty = args(&[]);
        assert_eq!(clamped_int(&empty, "limit", 1, 50, 10).unwrap(), 10);
        let big = args(&[("limit", Value::from(500))]);
        assert_eq!(clamped_int(&big, "limit", 1, 50, 10).unwrap(), 50);
        let zero = args(&[("limit", Value::from(0))]);
        assert_eq!(clamped_int(&zero, "limit", 1, 50, 10).unwrap(), 1);
        let bad = args(&[("limit", Value::String("ten".into()))]);
        assert!(clamped_int(&bad, "limit", 1, 50, 10).is_err());
    }

    #[test]
    fn test_optional_languages_shapes() {
        let csv = args(&[("languages", Value::String("rust, python".into()))]);
        let parsed = optional_languages(&csv, "languages").unwrap().unwrap();
        assert_eq!(parsed, vec![Language::Rust, Language::Python]);

        let array = args(&[(
            "languages",
            Value::Array(vec![Value::String("go".into())]),
        )]);
        assert_eq!(
            optional_languages(&array, "languages").unwrap().unwrap(),
            vec![Language::Go]
        );

        let unknown = args(&[("languages", Value::String("cobol".into()))]);
        assert!(optional_languages(&unknown, "languages").is_err());
    }

    #[test]
    fn test_optional_enum() {
        let a = args(&[("preset", Value::String("quick".into()))]);
        assert_eq!(
            optional_enum(&a, "preset", &["quick", "default", "thorough"]).unwrap(),
            Some("quick".to_string())
        );
        let bad = args(&[("preset", Value::String("exhaustive".into()))]);
        assert!(optional_enum(&bad, "preset", &["quick", "default", "thorough"]).is_err());
    }

    #[test]
    fn test_resolve_wiki_page_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.md"), "# hi").unwrap();
        std::fs::create_dir_all(dir.path().join("files")).unwrap();
        std::fs::write(dir.path().join("files/a.md"), "# a").unwrap();

        assert!(resolve_wiki_page(dir.path(), "index.md").is_ok());
        assert!(resolve_wiki_page(dir.path(), "files/a.md").is_ok());
        assert!(resolve_wiki_page(dir.path(), "../outside.md").is_err());
        assert!(resolve_wiki_page(dir.path(), "/etc/passwd").is_err());
        assert!(resolve_wiki_page(dir.path(), "").is_err());
    }
}
