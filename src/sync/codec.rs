//! Line-delimited JSON plan files.
//!
//! Line 1 is the header, every following line one operation. Loading is the
//! only validity gate for hand-edited plans: any problem rejects the whole
//! file, nothing is skipped.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::PlanCodecError;
use crate::fs::types::is_normalized;
use crate::sync::options::{Direction, SyncOptions};
use crate::sync::plan::{Action, PlanHeader, Reason, SyncOperation, SyncPlan};

/// Header as read from disk; required fields are checked by hand so the
/// error can name them.
#[derive(Deserialize)]
struct RawHeader {
    source: Option<String>,
    destination: Option<String>,
    direction: Option<Direction>,
    #[serde(default)]
    options: SyncOptions,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RawHeader {
    fn into_header(self) -> Result<PlanHeader, PlanCodecError> {
        let missing = |field: &str| PlanCodecError::Header {
            reason: format!("missing '{}'", field),
        };

        let source_uri = self.source.filter(|s| !s.is_empty()).ok_or_else(|| missing("source"))?;
        let destination_uri = self
            .destination
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing("destination"))?;
        let direction = self.direction.ok_or_else(|| missing("direction"))?;
        let created_at = self.created_at.ok_or_else(|| missing("created_at"))?;

        self.options.validate().map_err(|e| PlanCodecError::Header { reason: e.to_string() })?;

        Ok(PlanHeader {
            source_uri,
            destination_uri,
            direction,
            options: self.options,
            created_at,
        })
    }
}

/// Serialize a plan: header line, then one line per operation.
pub fn encode(plan: &SyncPlan) -> Result<String, PlanCodecError> {
    let mut output = serde_json::to_string(&plan.header).map_err(PlanCodecError::Encode)?;
    output.push('\n');
    for op in &plan.operations {
        output.push_str(&serde_json::to_string(op).map_err(PlanCodecError::Encode)?);
        output.push('\n');
    }
    Ok(output)
}

/// Parse and validate a plan.
pub fn decode(text: &str) -> Result<SyncPlan, PlanCodecError> {
    let mut lines = text.strip_suffix('\n').unwrap_or(text).split('\n').enumerate();

    let header_line = match lines.next() {
        Some((_, line)) if !line.trim().is_empty() => line,
        _ => return Err(PlanCodecError::Empty),
    };
    let raw: RawHeader = serde_json::from_str(header_line.trim_end_matches('\r'))
        .map_err(|source| PlanCodecError::MalformedLine { line: 1, source })?;
    let header = raw.into_header()?;

    let transfer = header.direction.transfer_action();
    let mut seen = HashSet::new();
    let mut operations = Vec::new();

    for (index, line) in lines {
        let number = index + 1;
        let op: SyncOperation = serde_json::from_str(line.trim_end_matches('\r'))
            .map_err(|source| PlanCodecError::MalformedLine { line: number, source })?;
        validate_operation(&op, transfer, number)?;
        if !seen.insert(op.path.clone()) {
            return Err(PlanCodecError::InvalidOperation {
                line: number,
                reason: format!("'{}' appears more than once", op.path),
            });
        }
        operations.push(op);
    }

    Ok(SyncPlan::new(header, operations))
}

fn validate_operation(
    op: &SyncOperation,
    transfer: Action,
    line: usize,
) -> Result<(), PlanCodecError> {
    let invalid = |reason: String| Err(PlanCodecError::InvalidOperation { line, reason });

    if !is_normalized(&op.path) {
        return invalid(format!("'{}' is not a normalized relative path", op.path));
    }
    if op.action.is_transfer() && op.action != transfer {
        return invalid(format!("'{}' does not match the plan direction", op.action));
    }
    if op.reason == Reason::FilteredOut {
        return invalid("filtered_out operations cannot appear in a plan".to_string());
    }
    Ok(())
}

/// Write a plan file, replacing any existing one.
pub fn write_plan(plan: &SyncPlan, path: &Path) -> Result<(), PlanCodecError> {
    let text = encode(plan)?;
    std::fs::write(path, text).map_err(|source| PlanCodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and validate a plan file.
pub fn read_plan(path: &Path) -> Result<SyncPlan, PlanCodecError> {
    let text = std::fs::read_to_string(path).map_err(|source| PlanCodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&text)
}
