//! Included document resolution
//!
//! `<include resource="path"/>` pulls another document into the current
//! load. Paths are resolved relative to the including document's directory,
//! with extension fallback for paths written without one.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions tried when an include path does not exist as written.
pub const DEFAULT_EXTENSIONS: &[&str] = &["xml"];

/// Error type for include resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum IncludeError {
    /// File not found
    #[error("Include file not found '{}': {1}", .0.display())]
    FileNotFound(PathBuf, String),
    /// IO error reading file
    #[error("Error reading include file '{}': {1}", .0.display())]
    IoError(PathBuf, String),
}

/// Resolve a path, trying alternate extensions if the exact path doesn't exist.
///
/// Tries the exact path first, then each extension in order.
pub fn resolve_path_with_extensions<S: AsRef<str>>(
    path: &Path,
    extensions: &[S],
) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    extensions.iter().map(|ext| path.with_extension(ext.as_ref())).find(|alt| alt.is_file())
}

/// Resolve an include path to the canonical path of an existing file.
pub fn resolve_include<S: AsRef<str>>(
    include_path: &str,
    base_path: &Path,
    extensions: &[S],
) -> Result<PathBuf, IncludeError> {
    let resolved_path = base_path.join(include_path);

    let found_path = resolve_path_with_extensions(&resolved_path, extensions).ok_or_else(|| {
        let tried: Vec<&str> = extensions.iter().map(AsRef::as_ref).collect();
        IncludeError::FileNotFound(
            resolved_path.clone(),
            format!("file not found (tried extensions: {})", tried.join(", ")),
        )
    })?;

    // Canonicalize for consistent comparison (handles .., symlinks, etc.)
    found_path.canonicalize().map_err(|e| IncludeError::FileNotFound(found_path, e.to_string()))
}

/// Resolve an include and remember it in `visited`.
///
/// Returns `Ok(None)` when the document was already included, so each named
/// document is processed once per load.
pub fn resolve_include_with_detection<S: AsRef<str>>(
    include_path: &str,
    base_path: &Path,
    extensions: &[S],
    visited: &mut HashSet<PathBuf>,
) -> Result<Option<PathBuf>, IncludeError> {
    let canonical_path = resolve_include(include_path, base_path, extensions)?;
    if !visited.insert(canonical_path.clone()) {
        return Ok(None);
    }
    Ok(Some(canonical_path))
}

/// Read an included document.
pub fn read_include(path: &Path) -> Result<String, IncludeError> {
    fs::read_to_string(path).map_err(|e| IncludeError::IoError(path.to_path_buf(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolve_include_simple() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "palette.xml", "<resources/>");

        let path = resolve_include("palette.xml", temp_dir.path(), DEFAULT_EXTENSIONS).unwrap();
        assert!(path.ends_with("palette.xml"));
        assert_eq!(read_include(&path).unwrap(), "<resources/>");
    }

    #[test]
    fn test_resolve_include_file_not_found() {
        let temp_dir = TempDir::new().unwrap();

        match resolve_include("nonexistent", temp_dir.path(), DEFAULT_EXTENSIONS) {
            Err(IncludeError::FileNotFound(_, message)) => assert!(message.contains("xml")),
            other => panic!("Expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_include_extension_fallback_order() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "colors.res", "<a/>");
        write(temp_dir.path(), "colors.xml", "<b/>");

        let path = resolve_include("colors", temp_dir.path(), &["res", "xml"]).unwrap();
        assert!(path.ends_with("colors.res"));

        let path = resolve_include("colors", temp_dir.path(), &["xml", "res"]).unwrap();
        assert!(path.ends_with("colors.xml"));
    }

    #[test]
    fn test_resolve_include_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        let sub_dir = temp_dir.path().join("shared");
        fs::create_dir(&sub_dir).unwrap();
        write(&sub_dir, "colors.xml", "<resources/>");

        let via_parent = resolve_include("shared/../shared/colors", temp_dir.path(), &["xml"]);
        let direct = resolve_include("colors.xml", &sub_dir, DEFAULT_EXTENSIONS);
        assert_eq!(via_parent.unwrap(), direct.unwrap());
    }

    #[test]
    fn test_resolve_include_once() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "palette.xml", "<resources/>");
        let mut visited = HashSet::new();

        let first = resolve_include_with_detection(
            "palette.xml",
            temp_dir.path(),
            DEFAULT_EXTENSIONS,
            &mut visited,
        );
        assert!(first.unwrap().is_some());

        let second =
            resolve_include_with_detection("palette", temp_dir.path(), DEFAULT_EXTENSIONS, &mut visited);
        assert_eq!(second, Ok(None));
    }
}
