//! Plan execution with a bounded worker pool.
//!
//! Each operation moves `Pending -> InFlight -> Succeeded | Failed`. Failures
//! are recorded and the run continues; nothing is retried. Cancellation stops
//! dispatch and lets in-flight work finish, leaving the rest `Pending`.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PartialBatchError, TransferError};
use crate::sync::plan::{Action, SyncOperation, SyncPlan};
use crate::sync::summary::ExecutionSummary;
use crate::sync::transfer::TransferBackend;

pub const DEFAULT_DELETE_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 10;

/// Lifecycle of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    InFlight,
    Succeeded,
    Failed { error: String },
}

/// An operation and where it ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationOutcome {
    pub operation: SyncOperation,
    #[serde(flatten)]
    pub state: OperationState,
}

/// Per-operation outcomes of one run, in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<OperationOutcome>,
    pub cancelled: bool,
    #[serde(skip)]
    max_reported_errors: usize,
}

impl ExecutionReport {
    pub fn new(operations: Vec<SyncOperation>, max_reported_errors: usize) -> Self {
        Self {
            outcomes: operations
                .into_iter()
                .map(|operation| OperationOutcome {
                    operation,
                    state: OperationState::Pending,
                })
                .collect(),
            cancelled: false,
            max_reported_errors,
        }
    }

    fn set_state(&mut self, index: usize, state: OperationState) {
        if let Some(outcome) = self.outcomes.get_mut(index) {
            outcome.state = state;
        }
    }

    fn succeed(&mut self, index: usize) {
        self.set_state(index, OperationState::Succeeded);
    }

    fn fail(&mut self, index: usize, error: String) {
        self.set_state(index, OperationState::Failed { error });
    }

    /// Operations that failed, with their error messages.
    pub fn failures(&self) -> impl Iterator<Item = (&SyncOperation, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.state {
            OperationState::Failed { error } => Some((&o.operation, error.as_str())),
            _ => None,
        })
    }

    /// Operations never started.
    pub fn pending(&self) -> impl Iterator<Item = &SyncOperation> {
        self.outcomes
            .iter()
            .filter(|o| o.state == OperationState::Pending)
            .map(|o| &o.operation)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Counts per action and state, transferred bytes and the first errors.
    pub fn summary(&self) -> ExecutionSummary {
        let mut summary = ExecutionSummary {
            cancelled: self.cancelled,
            ..Default::default()
        };

        for outcome in &self.outcomes {
            let op = &outcome.operation;
            let tally = summary.tally_mut(op.action);
            match &outcome.state {
                OperationState::Succeeded => {
                    tally.succeeded += 1;
                    if op.action.is_transfer() {
                        summary.bytes_transferred += op.size.unwrap_or(0);
                    }
                }
                OperationState::Failed { error } => {
                    tally.failed += 1;
                    if summary.errors.len() < self.max_reported_errors {
                        summary.errors.push(format!("{} {}: {}", op.action, op.path, error));
                    }
                }
                OperationState::Pending | OperationState::InFlight => tally.pending += 1,
            }
        }
        summary
    }
}

/// Snapshot passed to the progress callback after each finished operation.
#[derive(Debug, Clone)]
pub struct ExecutionProgress {
    pub completed: usize,
    pub total: usize,
    pub bytes_done: u64,
    pub current: String,
}

pub type ProgressCallback = Arc<dyn Fn(&ExecutionProgress) + Send + Sync>;

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Worker count.
    pub concurrency: usize,
    /// Deletes handed to the backend per batch call.
    pub delete_batch_size: usize,
    /// Error messages kept in the summary.
    pub max_reported_errors: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
        }
    }
}

/// Unit of work pulled by a worker: plan indices.
#[derive(Debug)]
enum WorkUnit {
    Transfer(usize),
    DeleteBatch(Vec<usize>),
}

#[derive(Default)]
struct ProgressState {
    completed: usize,
    bytes_done: u64,
}

/// State shared by every worker of one run.
struct Shared {
    operations: Vec<SyncOperation>,
    report: Mutex<ExecutionReport>,
    progress_state: Mutex<ProgressState>,
    total: usize,
    transfer: Arc<dyn TransferBackend>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Shared {
    fn mark_in_flight(&self, indices: &[usize]) {
        let mut report = self.report.lock();
        for &index in indices {
            report.set_state(index, OperationState::InFlight);
        }
    }

    fn finish(&self, index: usize, result: Result<(), TransferError>) {
        let op = &self.operations[index];
        let succeeded = result.is_ok();
        match result {
            Ok(()) => {
                info!(action = %op.action, path = %op.path, "done");
                self.report.lock().succeed(index);
            }
            Err(err) => {
                error!(action = %op.action, path = %op.path, error = %err, "failed");
                self.report.lock().fail(index, err.to_string());
            }
        }
        self.notify(op, succeeded);
    }

    fn notify(&self, op: &SyncOperation, succeeded: bool) {
        let snapshot = {
            let mut state = self.progress_state.lock();
            state.completed += 1;
            if succeeded && op.action.is_transfer() {
                state.bytes_done += op.size.unwrap_or(0);
            }
            ExecutionProgress {
                completed: state.completed,
                total: self.total,
                bytes_done: state.bytes_done,
                current: op.path.clone(),
            }
        };
        if let Some(callback) = &self.progress {
            callback(&snapshot);
        }
    }

    async fn run_transfer(&self, index: usize) {
        let op = &self.operations[index];
        self.mark_in_flight(&[index]);
        info!(action = %op.action, path = %op.path, "starting");

        let result = match op.action {
            Action::Upload => self.transfer.put_file(op).await,
            Action::Download => self.transfer.get_file(op).await,
            Action::Delete | Action::Skip => Err(TransferError::failed(
                op.path.clone(),
                format!("{} is not a transfer", op.action),
            )),
        };
        self.finish(index, result);
    }

    async fn run_delete_batch(&self, indices: Vec<usize>) {
        self.mark_in_flight(&indices);
        let mut by_path: HashMap<String, usize> = indices
            .iter()
            .map(|&i| (self.operations[i].path.clone(), i))
            .collect();
        let paths: Vec<String> = indices.iter().map(|&i| self.operations[i].path.clone()).collect();
        info!(count = paths.len(), "deleting batch");

        let outcomes = self.transfer.delete_files(&paths).await;
        let (succeeded, partial) = PartialBatchError::split(outcomes);

        for path in succeeded {
            if let Some(index) = by_path.remove(&path) {
                self.finish(index, Ok(()));
            }
        }
        if let Some(partial) = partial {
            warn!(error = %partial, "delete batch partially failed");
            for err in partial.into_failures() {
                if let Some(index) = by_path.remove(err.path()) {
                    self.finish(index, Err(err));
                }
            }
        }
        for (path, index) in by_path {
            let error = TransferError::failed(path, "no outcome reported by batch delete");
            self.finish(index, Err(error));
        }
    }

    async fn worker(self: Arc<Self>, id: usize, queue: async_channel::Receiver<WorkUnit>) {
        while let Ok(unit) = queue.recv().await {
            if self.cancel.is_cancelled() {
                debug!(worker = id, "cancelled, leaving queued work pending");
                continue;
            }
            match unit {
                WorkUnit::Transfer(index) => self.run_transfer(index).await,
                WorkUnit::DeleteBatch(indices) => self.run_delete_batch(indices).await,
            }
        }
    }
}

/// Runs plans against a transfer backend.
pub struct Executor {
    transfer: Arc<dyn TransferBackend>,
    config: ExecutorConfig,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Executor {
    pub fn new(transfer: Arc<dyn TransferBackend>, config: ExecutorConfig) -> Self {
        Self {
            transfer,
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every operation of `plan`; never fails as a whole.
    pub async fn run(&self, plan: &SyncPlan) -> ExecutionReport {
        let concurrency = self.config.concurrency.max(1);
        let batch_size = self.config.delete_batch_size.max(1);
        let operations = plan.operations.clone();

        let mut report = ExecutionReport::new(operations.clone(), self.config.max_reported_errors);
        let mut units = Vec::new();
        let mut deletes = Vec::new();
        for (index, op) in operations.iter().enumerate() {
            match op.action {
                Action::Skip => report.succeed(index),
                Action::Delete => deletes.push(index),
                Action::Upload | Action::Download => units.push(WorkUnit::Transfer(index)),
            }
        }
        units.extend(deletes.chunks(batch_size).map(|chunk| WorkUnit::DeleteBatch(chunk.to_vec())));

        let total = operations.iter().filter(|op| op.action != Action::Skip).count();
        info!(operations = total, workers = concurrency, "executing plan");

        let shared = Arc::new(Shared {
            operations,
            report: Mutex::new(report),
            progress_state: Mutex::new(ProgressState::default()),
            total,
            transfer: self.transfer.clone(),
            cancel: self.cancel.clone(),
            progress: self.progress.clone(),
        });

        let (sender, receiver) = async_channel::bounded(concurrency);
        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            workers.spawn(shared.clone().worker(id, receiver.clone()));
        }
        drop(receiver);

        let mut cancelled = false;
        for unit in units {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                sent = sender.send(unit) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        sender.close();

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "sync worker stopped unexpectedly");
            }
        }

        let mut report = shared.report.lock().clone();
        report.cancelled = cancelled || self.cancel.is_cancelled();
        if report.cancelled {
            warn!(pending = report.pending().count(), "execution cancelled");
        }
        for outcome in report.outcomes.iter_mut() {
            if outcome.state == OperationState::InFlight {
                outcome.state = OperationState::Failed {
                    error: "worker stopped before the operation finished".to_string(),
                };
            }
        }
        report
    }
}

/// Execute `plan` with `concurrency` workers and default settings otherwise.
pub async fn execute(
    plan: &SyncPlan,
    transfer: Arc<dyn TransferBackend>,
    concurrency: usize,
) -> ExecutionReport {
    let config = ExecutorConfig {
        concurrency,
        ..Default::default()
    };
    Executor::new(transfer, config).run(plan).await
}
