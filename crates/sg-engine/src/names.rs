//! Branch name and tree path validation.
//!
//! Branch names follow git-style conventions:
//! - non-empty, no whitespace or any of `~ ^ : ? * [ \`
//! - no `..` and no `@{`
//! - must not start or end with `.` or `/`, must not end with `.lock`
//! - `/`-separated components are non-empty and never start with `.`
//!
//! Tree paths are site-relative and `/`-separated. They are never absolute
//! and never contain empty, `.`, or `..` components, so materializing a tree
//! can never escape its output directory. Within one snapshot no file path
//! may also be the directory of another file.

use std::collections::BTreeSet;

use crate::error::{EngineError, Result};

const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn bad_name(name: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidBranchName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn bad_path(path: &str, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name, returning `Ok(())` if valid.
///
/// ```
/// use sg_engine::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("docs/v2").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(bad_name(name, "branch name must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control()) {
        return Err(bad_name(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(bad_name(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(bad_name(name, "must not contain '@{'"));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(bad_name(name, "must not start or end with '.'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(bad_name(name, "must not start or end with '/'"));
    }
    if name.ends_with(".lock") {
        return Err(bad_name(name, "must not end with '.lock'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(bad_name(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(bad_name(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
    }
    Ok(())
}

/// Validate a site-relative file path, returning `Ok(())` if valid.
pub fn validate_tree_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(bad_path(path, "path must not be empty"));
    }
    if path.starts_with('/') {
        return Err(bad_path(path, "path must be relative"));
    }
    if path.contains('\\') {
        return Err(bad_path(path, "path separator must be '/'"));
    }
    if path.contains('\0') {
        return Err(bad_path(path, "path must not contain NUL"));
    }
    for component in path.split('/') {
        match component {
            "" => return Err(bad_path(path, "path components must not be empty")),
            "." | ".." => {
                return Err(bad_path(
                    path,
                    format!("path must not contain {component:?} components"),
                ))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Check that a snapshot's paths can coexist on a filesystem.
///
/// Fails on the first path that is also a parent directory of another path
/// (`docs` next to `docs/a.html`).
pub fn validate_tree_layout<'a>(paths: impl IntoIterator<Item = &'a str>) -> Result<()> {
    let mut files = BTreeSet::new();
    let mut dirs = BTreeSet::new();
    for path in paths {
        files.insert(path);
        for (i, _) in path.match_indices('/') {
            dirs.insert(&path[..i]);
        }
    }
    match files.intersection(&dirs).next() {
        Some(path) => Err(bad_path(path, "path is also a directory of another file")),
        None => Ok(()),
    }
}
