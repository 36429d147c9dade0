//! Error types shared by the storage backends and the sync engine.
//!
//! Listing, filter, codec and configuration errors are fatal: they are raised
//! before anything is written to either side. Transfer errors are recorded per
//! operation and never abort a run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::fs::BatchItem;

/// A side's inventory could not be produced.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error(
        "Directory not found: {}\n\
         Suggestion: Check that the path is correct and the directory exists",
        root.display()
    )]
    RootNotFound { root: PathBuf },

    #[error("I/O error while listing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk {}: {message}", root.display())]
    Walk { root: PathBuf, message: String },

    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("Failed to list {location}: {source}")]
    Remote {
        location: String,
        #[source]
        source: opendal::Error,
    },

    #[error("Listing produced an invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Listing contains '{path}' more than once")]
    DuplicatePath { path: String },
}

/// A filter pattern or filter file is malformed.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Empty filter pattern")]
    EmptyPattern,

    #[error(
        "Malformed filter rule at {}:{line}: '{content}'\n\
         Suggestion: Rules must start with '+ ' or '- ' followed by a pattern",
        file.display()
    )]
    MalformedLine {
        file: PathBuf,
        line: usize,
        content: String,
    },

    #[error("Failed to read filter file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A plan file could not be encoded or failed validation on load.
#[derive(Debug, Error)]
pub enum PlanCodecError {
    #[error("Plan is empty: a header line is required")]
    Empty,

    #[error("Invalid plan header: {reason}")]
    Header { reason: String },

    #[error("Malformed plan line {line}: {source}")]
    MalformedLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid operation at plan line {line}: {reason}")]
    InvalidOperation { line: usize, reason: String },

    #[error("Failed to serialize plan: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("I/O error on plan file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Configuration file problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A single operation failed during execution.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        path: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Remote store error on {path}: {source}")]
    Remote {
        path: String,
        #[source]
        source: opendal::Error,
    },

    #[error("{path}: {message}")]
    Failed { path: String, message: String },
}

impl TransferError {
    /// Build a free-form failure for `path`.
    pub fn failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The relative path the failure concerns.
    pub fn path(&self) -> &str {
        match self {
            Self::Io { path, .. } | Self::Remote { path, .. } | Self::Failed { path, .. } => path,
        }
    }
}

/// A batch call finished with a mix of successes and failures.
#[derive(Debug, Error)]
#[error("Batch of {total} paths finished with {} failures", failures.len())]
pub struct PartialBatchError {
    pub total: usize,
    pub failures: Vec<TransferError>,
}

impl PartialBatchError {
    /// Split batch outcomes into the succeeded paths and, when anything
    /// failed, the partial-failure error holding the per-path errors.
    pub fn split(outcomes: Vec<BatchItem>) -> (Vec<String>, Option<PartialBatchError>) {
        let total = outcomes.len();
        let mut succeeded = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for item in outcomes {
            match item.result {
                Ok(()) => succeeded.push(item.path),
                Err(err) => failures.push(err),
            }
        }

        if failures.is_empty() {
            (succeeded, None)
        } else {
            (succeeded, Some(PartialBatchError { total, failures }))
        }
    }

    /// Decompose into the per-path transfer errors.
    pub fn into_failures(self) -> Vec<TransferError> {
        self.failures
    }
}

/// Umbrella error for anything that aborts a sync before execution.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    PlanCodec(#[from] PlanCodecError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid sync options: {0}")]
    InvalidOptions(String),

    #[error("Invalid endpoint '{uri}': {reason}")]
    Endpoint { uri: String, reason: String },

    #[error("Failed to open {location}: {source}")]
    Backend {
        location: String,
        #[source]
        source: opendal::Error,
    },
}
