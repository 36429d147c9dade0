//! Aggregation over plans and execution reports.

use serde::Serialize;
use std::fmt;

use crate::sync::plan::{Action, SyncOperation};

/// Operation counts and transfer volume of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub uploads: usize,
    pub downloads: usize,
    pub deletes: usize,
    pub skips: usize,
    /// Bytes moved by uploads and downloads; deletes and skips do not count.
    pub total_bytes: u64,
}

impl SyncSummary {
    pub fn from_operations<'a, I>(operations: I) -> Self
    where
        I: IntoIterator<Item = &'a SyncOperation>,
    {
        let mut summary = Self::default();
        for op in operations {
            summary.record(op);
        }
        summary
    }

    pub fn record(&mut self, op: &SyncOperation) {
        *self.count_mut(op.action) += 1;
        if op.action.is_transfer() {
            self.total_bytes += op.size.unwrap_or(0);
        }
    }

    pub fn count(&self, action: Action) -> usize {
        match action {
            Action::Upload => self.uploads,
            Action::Download => self.downloads,
            Action::Delete => self.deletes,
            Action::Skip => self.skips,
        }
    }

    fn count_mut(&mut self, action: Action) -> &mut usize {
        match action {
            Action::Upload => &mut self.uploads,
            Action::Download => &mut self.downloads,
            Action::Delete => &mut self.deletes,
            Action::Skip => &mut self.skips,
        }
    }

    pub fn total_operations(&self) -> usize {
        self.uploads + self.downloads + self.deletes + self.skips
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} uploads, {} downloads, {} deletes, {} skipped ({} to transfer)",
            self.uploads,
            self.downloads,
            self.deletes,
            self.skips,
            humansize::format_size(self.total_bytes, humansize::BINARY)
        )
    }
}

/// Outcome counts for one action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionTally {
    pub succeeded: usize,
    pub failed: usize,
    /// Never dispatched (cancelled run).
    pub pending: usize,
}

/// Aggregated result of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub uploads: ActionTally,
    pub downloads: ActionTally,
    pub deletes: ActionTally,
    pub skips: ActionTally,
    /// Bytes moved by successful uploads and downloads.
    pub bytes_transferred: u64,
    /// First error messages, for display.
    pub errors: Vec<String>,
    pub cancelled: bool,
}

impl ExecutionSummary {
    pub fn tally(&self, action: Action) -> &ActionTally {
        match action {
            Action::Upload => &self.uploads,
            Action::Download => &self.downloads,
            Action::Delete => &self.deletes,
            Action::Skip => &self.skips,
        }
    }

    pub fn tally_mut(&mut self, action: Action) -> &mut ActionTally {
        match action {
            Action::Upload => &mut self.uploads,
            Action::Download => &mut self.downloads,
            Action::Delete => &mut self.deletes,
            Action::Skip => &mut self.skips,
        }
    }

    pub fn total_succeeded(&self) -> usize {
        Action::ALL.iter().map(|a| self.tally(*a).succeeded).sum()
    }

    pub fn total_failed(&self) -> usize {
        Action::ALL.iter().map(|a| self.tally(*a).failed).sum()
    }

    pub fn total_pending(&self) -> usize {
        Action::ALL.iter().map(|a| self.tally(*a).pending).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.total_failed() > 0
    }

    /// Format the summary as plain text
    pub fn to_plain_text(&self) -> String {
        let mut output = String::new();
        for action in Action::ALL {
            let tally = self.tally(action);
            output.push_str(&format!(
                "  {:<9} {} ok, {} failed",
                format!("{}:", action),
                tally.succeeded,
                tally.failed
            ));
            if tally.pending > 0 {
                output.push_str(&format!(", {} not started", tally.pending));
            }
            output.push('\n');
        }
        output.push_str(&format!(
            "  Transferred: {}\n",
            humansize::format_size(self.bytes_transferred, humansize::BINARY)
        ));
        if self.cancelled {
            output.push_str("  Run was cancelled before all operations started\n");
        }
        output
    }
}
