use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ListingError;

/// Kind of entry a listing produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    File,
    Directory,
}

/// One entry from either side of a sync, relative to that side's root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub kind: RecordKind,
}

impl FileRecord {
    pub fn file(path: impl Into<String>, size: u64, modified: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            size: Some(size),
            modified,
            kind: RecordKind::File,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
            modified: None,
            kind: RecordKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == RecordKind::File
    }
}

/// Normalize a relative path to the `a/b/c` form used as a listing key.
///
/// Leading `/`, empty and `.` segments are dropped. A `..` segment is
/// rejected rather than resolved: a key must never point outside its root.
/// Backslash is a separator only on Windows; elsewhere it is a filename byte.
pub fn normalize_relative(path: &str) -> Result<String, ListingError> {
    let unified = if cfg!(windows) {
        path.replace('\\', "/")
    } else {
        path.to_string()
    };
    let mut segments = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ListingError::InvalidPath {
                    path: path.to_string(),
                    reason: "'..' segments are not allowed".to_string(),
                })
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(ListingError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty".to_string(),
        });
    }

    Ok(segments.join("/"))
}

/// Whether `path` is already in normalized form.
pub fn is_normalized(path: &str) -> bool {
    matches!(normalize_relative(path), Ok(normalized) if normalized == path)
}
