//! Transfer collaborators used by the executor.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::TransferError;
use crate::fs::{BatchItem, LocalBackend, StorageBackend};
use crate::sync::options::Direction;
use crate::sync::plan::SyncOperation;
use crate::sync::throttle::BandwidthLimiter;

/// Performs the side effects of plan operations.
///
/// Paths are relative to the sync roots. `delete_files` targets the
/// destination and reports one outcome per path; it need not be atomic.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Copy a local file to the remote side.
    async fn put_file(&self, op: &SyncOperation) -> Result<(), TransferError>;

    /// Copy a remote object to the local side.
    async fn get_file(&self, op: &SyncOperation) -> Result<(), TransferError>;

    /// Delete destination paths.
    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem>;
}

/// Transfers between a local directory and a storage backend.
pub struct BackendTransfer {
    local: Arc<LocalBackend>,
    remote: Arc<dyn StorageBackend>,
    direction: Direction,
    limiter: BandwidthLimiter,
}

impl BackendTransfer {
    pub fn new(
        local: Arc<LocalBackend>,
        remote: Arc<dyn StorageBackend>,
        direction: Direction,
    ) -> Self {
        Self {
            local,
            remote,
            direction,
            limiter: BandwidthLimiter::unlimited(),
        }
    }

    pub fn with_limiter(mut self, limiter: BandwidthLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn destination(&self) -> &dyn StorageBackend {
        match self.direction {
            Direction::LocalToRemote => self.remote.as_ref(),
            Direction::RemoteToLocal => self.local.as_ref(),
        }
    }
}

#[async_trait]
impl TransferBackend for BackendTransfer {
    async fn put_file(&self, op: &SyncOperation) -> Result<(), TransferError> {
        self.limiter.acquire(op.size.unwrap_or(0)).await;
        let local_path = self.local.full_path(&op.path);
        debug!(path = %op.path, to = %self.remote.display_path(&op.path), "uploading");
        self.remote.upload(&local_path, &op.path, op.modified).await
    }

    async fn get_file(&self, op: &SyncOperation) -> Result<(), TransferError> {
        self.limiter.acquire(op.size.unwrap_or(0)).await;
        let local_path = self.local.full_path(&op.path);
        debug!(path = %op.path, from = %self.remote.display_path(&op.path), "downloading");
        self.remote.download(&op.path, &local_path).await?;

        if let Some(modified) = op.modified {
            LocalBackend::set_modified(&local_path, modified).map_err(|source| TransferError::Io {
                path: op.path.clone(),
                operation: "setting mtime of",
                source,
            })?;
        }
        Ok(())
    }

    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem> {
        self.destination().delete_files(paths).await
    }
}
