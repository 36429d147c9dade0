//! Comparison-mode flags and sync direction.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::sync::plan::Action;

/// Which way data flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Local directory -> bucket.
    #[serde(rename = "upload")]
    LocalToRemote,
    /// Bucket -> local directory.
    #[serde(rename = "download")]
    RemoteToLocal,
}

impl Direction {
    /// The transfer action used for paths that need copying.
    pub fn transfer_action(&self) -> Action {
        match self {
            Direction::LocalToRemote => Action::Upload,
            Direction::RemoteToLocal => Action::Download,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::LocalToRemote => "upload",
            Direction::RemoteToLocal => "download",
        }
    }
}

/// Immutable diff options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Delete destination files that are absent from the source.
    pub delete: bool,
    /// Do not compare modification times.
    pub ignore_times: bool,
    /// Do not compare sizes.
    pub ignore_sizes: bool,
    /// Only update files that already exist at the destination.
    pub existing: bool,
    /// Only create files that do not exist at the destination.
    pub ignore_existing: bool,
}

impl SyncOptions {
    /// Reject flag combinations with no defined meaning.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.existing && self.ignore_existing {
            return Err(SyncError::InvalidOptions(
                "--existing and --ignore-existing cannot be combined: \
                 together they would skip every file"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn compare_sizes(&self) -> bool {
        !self.ignore_sizes
    }

    pub fn compare_times(&self) -> bool {
        !self.ignore_times
    }
}
