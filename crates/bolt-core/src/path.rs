//! Workspace path normalization.
//!
//! Every path that enters the workspace goes through [`normalize_path`]. The
//! normalized form has no leading separator, uses `/` between segments and
//! never contains `..`, so two spellings of the same file always map to the
//! same key.

use thiserror::Error;

pub const SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRejection {
    Empty,
    ParentSegment,
}

impl PathRejection {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "path is empty",
            Self::ParentSegment => "path escapes the project root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected path {:?}: {}", .path, .reason.label())]
pub struct PathError {
    pub path: String,
    pub reason: PathRejection,
}

impl PathError {
    fn new(path: &str, reason: PathRejection) -> Self {
        Self {
            path: path.to_string(),
            reason,
        }
    }
}

/// Normalizes a project path.
///
/// Backslashes are treated as separators and one leading separator is
/// stripped. Empty and `.` segments are dropped. Any `..` segment rejects the
/// whole path.
pub fn normalize_path(raw: &str) -> Result<String, PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::new(raw, PathRejection::Empty));
    }

    let unified = raw.replace('\\', "/");
    let trimmed = unified.strip_prefix(SEPARATOR).unwrap_or(&unified);

    let mut segments = Vec::new();
    for segment in trimmed.split(SEPARATOR) {
        match segment {
            "" | "." => continue,
            ".." => return Err(PathError::new(raw, PathRejection::ParentSegment)),
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(PathError::new(raw, PathRejection::Empty));
    }
    Ok(segments.join("/"))
}

/// Yields every ancestor folder of a normalized path, outermost first.
///
/// `src/components/App.js` yields `src` then `src/components`.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices(SEPARATOR).map(move |(idx, _)| &path[..idx])
}

pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or(path)
}
