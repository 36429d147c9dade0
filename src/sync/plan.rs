//! In-memory plan model: header plus one operation per surviving path.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sync::options::{Direction, SyncOptions};
use crate::sync::summary::SyncSummary;

/// What to do with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Upload,
    Download,
    Delete,
    Skip,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Upload, Action::Download, Action::Delete, Action::Skip];

    pub fn is_transfer(&self) -> bool {
        matches!(self, Action::Upload | Action::Download)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Delete => "delete",
            Action::Skip => "skip",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an operation was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NewFile,
    SizeChanged,
    TimeChanged,
    /// Accepted on load for plans written by other tools; the diff never emits it.
    DeletedRemotelyExcludedByExisting,
    MissingInSource,
    Unchanged,
    /// Never written into a plan: filtered paths are dropped before diffing.
    FilteredOut,
    NewFileSkippedExistingOnly,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NewFile => "new_file",
            Reason::SizeChanged => "size_changed",
            Reason::TimeChanged => "time_changed",
            Reason::DeletedRemotelyExcludedByExisting => "deleted_remotely_excluded_by_existing",
            Reason::MissingInSource => "missing_in_source",
            Reason::Unchanged => "unchanged",
            Reason::FilteredOut => "filtered_out",
            Reason::NewFileSkippedExistingOnly => "new_file_skipped_existing_only",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned action on one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub action: Action,
    pub path: String,
    pub reason: Reason,
    /// Bytes to move for transfers; the destination's size for deletes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Source modification time, applied to the destination after a transfer.
    #[serde(default, rename = "mtime", skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl SyncOperation {
    pub fn new(action: Action, path: impl Into<String>, reason: Reason, size: Option<u64>) -> Self {
        Self {
            action,
            path: path.into(),
            reason,
            size,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<DateTime<Utc>>) -> Self {
        self.modified = modified;
        self
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} {} ({})", self.action.as_str(), self.path, self.reason)
    }
}

/// Plan header: where data flows and under which options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanHeader {
    #[serde(rename = "source")]
    pub source_uri: String,
    #[serde(rename = "destination")]
    pub destination_uri: String,
    pub direction: Direction,
    #[serde(default)]
    pub options: SyncOptions,
    pub created_at: DateTime<Utc>,
}

impl PlanHeader {
    /// Header stamped with the current time (whole seconds).
    pub fn new(
        source_uri: impl Into<String>,
        destination_uri: impl Into<String>,
        direction: Direction,
        options: SyncOptions,
    ) -> Self {
        Self {
            source_uri: source_uri.into(),
            destination_uri: destination_uri.into(),
            direction,
            options,
            created_at: Utc::now().trunc_subsecs(0),
        }
    }
}

/// A reviewable, replayable list of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub header: PlanHeader,
    pub operations: Vec<SyncOperation>,
}

impl SyncPlan {
    pub fn new(header: PlanHeader, operations: Vec<SyncOperation>) -> Self {
        Self { header, operations }
    }

    pub fn summary(&self) -> SyncSummary {
        SyncSummary::from_operations(&self.operations)
    }

    /// Operations that change either side.
    pub fn pending_work(&self) -> impl Iterator<Item = &SyncOperation> {
        self.operations.iter().filter(|op| op.action != Action::Skip)
    }

    /// True when applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.pending_work().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
