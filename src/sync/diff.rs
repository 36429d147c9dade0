//! Diff engine: filtered source and destination listings in, plan out.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ListingError, SyncError};
use crate::fs::types::{is_normalized, FileRecord};
use crate::sync::filter::FilterRules;
use crate::sync::options::SyncOptions;
use crate::sync::plan::{Action, PlanHeader, Reason, SyncOperation, SyncPlan};

/// Index the files of one listing that survive `rules`, keyed by path.
///
/// Directories are structural only and dropped. A path listed twice, or one
/// that is not in normalized form, makes the whole listing untrustworthy.
pub fn index_listing<'a>(
    records: &'a [FileRecord],
    rules: &FilterRules,
) -> Result<BTreeMap<&'a str, &'a FileRecord>, ListingError> {
    let mut index = BTreeMap::new();
    let mut excluded = 0usize;

    for record in records.iter().filter(|r| r.is_file()) {
        if !is_normalized(&record.path) {
            return Err(ListingError::InvalidPath {
                path: record.path.clone(),
                reason: "path is not normalized".to_string(),
            });
        }
        if !rules.is_included(&record.path) {
            excluded += 1;
            continue;
        }
        if index.insert(record.path.as_str(), record).is_some() {
            return Err(ListingError::DuplicatePath {
                path: record.path.clone(),
            });
        }
    }

    if excluded > 0 {
        debug!(excluded, "records removed by filter rules");
    }
    Ok(index)
}

/// Equal at one-second granularity. Unknown times never count as a change.
fn times_equal(source: Option<DateTime<Utc>>, dest: Option<DateTime<Utc>>) -> bool {
    match (source, dest) {
        (Some(s), Some(d)) => s.timestamp() == d.timestamp(),
        _ => true,
    }
}

/// Why two same-path files differ under `options`, if they do.
fn change_reason(
    source: &FileRecord,
    dest: &FileRecord,
    options: &SyncOptions,
) -> Option<Reason> {
    if options.compare_sizes() && source.size != dest.size {
        return Some(Reason::SizeChanged);
    }
    if options.compare_times() && !times_equal(source.modified, dest.modified) {
        return Some(Reason::TimeChanged);
    }
    None
}

fn decide(
    source: &FileRecord,
    dest: Option<&FileRecord>,
    options: &SyncOptions,
    transfer: Action,
) -> SyncOperation {
    let skip = |reason| SyncOperation::new(Action::Skip, source.path.clone(), reason, source.size);
    let copy = |reason| {
        SyncOperation::new(transfer, source.path.clone(), reason, source.size)
            .with_modified(source.modified)
    };

    match dest {
        Some(_) if options.ignore_existing => skip(Reason::Unchanged),
        None if options.existing => skip(Reason::NewFileSkippedExistingOnly),
        None => copy(Reason::NewFile),
        Some(dest) => match change_reason(source, dest, options) {
            Some(reason) => copy(reason),
            None => skip(Reason::Unchanged),
        },
    }
}

/// Compute the plan that makes the destination match the source.
///
/// Options and direction come from `header`. Operations are sorted by path,
/// so identical inputs always give identical plans.
pub fn diff(
    source: &[FileRecord],
    destination: &[FileRecord],
    rules: &FilterRules,
    header: PlanHeader,
) -> Result<SyncPlan, SyncError> {
    let options = header.options;
    options.validate()?;

    let sources = index_listing(source, rules)?;
    let dests = index_listing(destination, rules)?;
    let transfer = header.direction.transfer_action();

    let mut operations: Vec<SyncOperation> = sources
        .iter()
        .map(|(path, record)| decide(record, dests.get(path).copied(), &options, transfer))
        .collect();

    if options.delete {
        operations.extend(
            dests
                .iter()
                .filter(|(path, _)| !sources.contains_key(*path))
                .map(|(path, record)| {
                    SyncOperation::new(Action::Delete, *path, Reason::MissingInSource, record.size)
                }),
        );
    }

    operations.sort_by(|a, b| a.path.cmp(&b.path));

    let plan = SyncPlan::new(header, operations);
    debug!(summary = %plan.summary(), "diff complete");
    Ok(plan)
}
