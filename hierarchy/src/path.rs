//! Directory path rules
//!
//! Root is `/`. Every other path is `/seg(/seg)*` where each segment is
//! non-empty, is not `.` or `..`, and contains no `/`.

use crate::errors::{HierarchyError, Result};

pub const ROOT: &str = "/";

/// Check that `path` is already in canonical form.
pub fn validate(path: &str) -> Result<()> {
    if path == ROOT {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(invalid(path, "must start with '/'"));
    };
    if rest.ends_with('/') {
        return Err(invalid(path, "must not end with '/'"));
    }
    for segment in rest.split('/') {
        validate_segment(segment).map_err(|reason| invalid(path, reason))?;
    }
    Ok(())
}

/// Canonicalize user input: trims whitespace, adds the leading slash,
/// collapses repeated slashes and drops a trailing slash.
pub fn normalize(input: &str) -> Result<String> {
    let segments: Vec<&str> = input
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    for segment in &segments {
        validate_segment(segment).map_err(|reason| invalid(input, reason))?;
    }
    if segments.is_empty() {
        return Ok(ROOT.to_string());
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Path of the child `name` under `parent`.
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Segments of a canonical path (empty for root).
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn validate_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty segment");
    }
    if segment == "." || segment == ".." {
        return Err("relative segment");
    }
    if segment.contains('/') {
        return Err("segment contains '/'");
    }
    if segment.trim() != segment {
        return Err("segment has surrounding whitespace");
    }
    Ok(())
}

fn invalid(path: &str, reason: &'static str) -> HierarchyError {
    HierarchyError::InvalidPath {
        path: path.to_string(),
        reason,
    }
}
