//! Directory/bucket synchronization.
//!
//! Listings from both sides are filtered, diffed into a [`SyncPlan`], which
//! can be written to disk for review or handed straight to the [`Executor`].

pub mod codec;
pub mod diff;
pub mod engine;
pub mod executor;
pub mod filter;
pub mod options;
pub mod plan;
pub mod summary;
pub mod throttle;
pub mod transfer;

pub use codec::{decode, encode, read_plan, write_plan};
pub use diff::diff;
pub use engine::{SyncConfig, SyncEngine};
pub use executor::{
    execute, ExecutionProgress, ExecutionReport, Executor, ExecutorConfig, OperationOutcome,
    OperationState, ProgressCallback,
};
pub use filter::{matches, FilterDecision, FilterRule, FilterRules, Polarity};
pub use options::{Direction, SyncOptions};
pub use plan::{Action, PlanHeader, Reason, SyncOperation, SyncPlan};
pub use summary::{ActionTally, ExecutionSummary, SyncSummary};
pub use throttle::{BandwidthLimit, BandwidthLimiter};
pub use transfer::{BackendTransfer, TransferBackend};
