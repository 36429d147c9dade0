//! Sync engine: lists both sides, diffs them into a plan and runs plans.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ListingError, SyncError};
use crate::fs::{FileRecord, LocalBackend, StorageBackend};
use crate::sync::diff::diff;
use crate::sync::executor::{ExecutionReport, Executor, ExecutorConfig, ProgressCallback};
use crate::sync::filter::FilterRules;
use crate::sync::options::{Direction, SyncOptions};
use crate::sync::plan::{PlanHeader, SyncPlan};
use crate::sync::throttle::{BandwidthLimit, BandwidthLimiter};
use crate::sync::transfer::BackendTransfer;

/// Sync configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    /// Comparison-mode flags.
    pub options: SyncOptions,
    /// Include/exclude rules applied to both sides.
    pub filters: FilterRules,
    /// Worker pool and reporting settings.
    pub executor: ExecutorConfig,
    /// Bandwidth limit shared by all transfers.
    pub bandwidth_limit: BandwidthLimit,
}

/// Orchestrates one local directory against one remote store.
pub struct SyncEngine {
    local: Arc<LocalBackend>,
    remote: Arc<dyn StorageBackend>,
    direction: Direction,
    config: SyncConfig,
    source_uri: String,
    destination_uri: String,
}

impl SyncEngine {
    /// `source_uri`/`destination_uri` are recorded in plan headers.
    pub fn new(
        local: Arc<LocalBackend>,
        remote: Arc<dyn StorageBackend>,
        direction: Direction,
        config: SyncConfig,
    ) -> Self {
        let local_uri = local.root.display().to_string();
        let remote_uri = remote.display_path("");
        let (source_uri, destination_uri) = match direction {
            Direction::LocalToRemote => (local_uri, remote_uri),
            Direction::RemoteToLocal => (remote_uri, local_uri),
        };
        Self {
            local,
            remote,
            direction,
            config,
            source_uri,
            destination_uri,
        }
    }

    /// Override the endpoint names written into plan headers.
    pub fn with_uris(
        mut self,
        source_uri: impl Into<String>,
        destination_uri: impl Into<String>,
    ) -> Self {
        self.source_uri = source_uri.into();
        self.destination_uri = destination_uri.into();
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// List the local side. A missing directory is empty when it is the
    /// destination: the first download creates it.
    async fn list_local(&self) -> Result<Vec<FileRecord>, ListingError> {
        match self.local.list_files().await {
            Err(ListingError::RootNotFound { root })
                if self.direction == Direction::RemoteToLocal =>
            {
                debug!(root = %root.display(), "destination directory absent, treating as empty");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// List both sides concurrently, as (source, destination).
    pub async fn list(&self) -> Result<(Vec<FileRecord>, Vec<FileRecord>), SyncError> {
        let (local, remote) = tokio::try_join!(self.list_local(), self.remote.list_files())?;
        debug!(local = local.len(), remote = remote.len(), "listings complete");
        Ok(match self.direction {
            Direction::LocalToRemote => (local, remote),
            Direction::RemoteToLocal => (remote, local),
        })
    }

    /// Build a plan from fresh listings of both sides.
    pub async fn plan(&self) -> Result<SyncPlan, SyncError> {
        self.config.options.validate()?;
        info!(
            source = %self.source_uri,
            destination = %self.destination_uri,
            remote = self.remote.backend_type().short_name(),
            "planning sync"
        );

        let (source, destination) = self.list().await?;
        let header = PlanHeader::new(
            self.source_uri.clone(),
            self.destination_uri.clone(),
            self.direction,
            self.config.options,
        );
        diff(&source, &destination, &self.config.filters, header)
    }

    /// Executor wired to this engine's backends.
    pub fn executor(&self) -> Executor {
        let transfer = BackendTransfer::new(self.local.clone(), self.remote.clone(), self.direction)
            .with_limiter(BandwidthLimiter::new(self.config.bandwidth_limit));
        Executor::new(Arc::new(transfer), self.config.executor.clone())
    }

    /// Run a plan; the plan is not re-checked against the current state.
    pub async fn execute(
        &self,
        plan: &SyncPlan,
        cancel: CancellationToken,
        progress: Option<ProgressCallback>,
    ) -> Result<ExecutionReport, SyncError> {
        if plan.header.direction != self.direction {
            return Err(SyncError::InvalidOptions(format!(
                "plan direction '{}' does not match engine direction '{}'",
                plan.header.direction.as_str(),
                self.direction.as_str()
            )));
        }

        let mut executor = self.executor().with_cancellation(cancel);
        if let Some(progress) = progress {
            executor = executor.with_progress(progress);
        }
        Ok(executor.run(plan).await)
    }

    /// Plan and immediately execute.
    pub async fn sync(
        &self,
        cancel: CancellationToken,
    ) -> Result<(SyncPlan, ExecutionReport), SyncError> {
        let plan = self.plan().await?;
        let report = self.execute(&plan, cancel, None).await?;
        Ok((plan, report))
    }
}
