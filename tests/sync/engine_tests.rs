// End-to-end sync tests against local directories and an in-memory bucket

use crate::common::write_file;
use async_trait::async_trait;
use bucketsync::error::{ListingError, SyncError, TransferError};
use bucketsync::fs::{BatchItem, BucketBackend, LocalBackend, StorageBackend};
use bucketsync::sync::{
    read_plan, write_plan, Action, BackendTransfer, Direction, Executor, ExecutorConfig,
    FilterRules, Reason, SyncConfig, SyncEngine, SyncOperation, SyncOptions, SyncPlan,
    TransferBackend,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn engine(
    local: &TempDir,
    remote: Arc<dyn StorageBackend>,
    direction: Direction,
    config: SyncConfig,
) -> SyncEngine {
    SyncEngine::new(Arc::new(LocalBackend::new(local.path())), remote, direction, config)
}

fn config(options: SyncOptions) -> SyncConfig {
    SyncConfig {
        options,
        executor: ExecutorConfig {
            concurrency: 2,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn actions(plan: &SyncPlan) -> Vec<(&str, Action, Reason)> {
    plan.operations
        .iter()
        .map(|op| (op.path.as_str(), op.action, op.reason))
        .collect()
}

#[tokio::test]
async fn test_upload_then_replan_is_all_skips() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", b"alpha");
    write_file(local.path(), "nested/deep/b.bin", b"bravo bytes");

    let engine = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );

    let (plan, report) = engine.sync(CancellationToken::new()).await.unwrap();
    assert_eq!(
        actions(&plan),
        vec![
            ("a.txt", Action::Upload, Reason::NewFile),
            ("nested/deep/b.bin", Action::Upload, Reason::NewFile),
        ]
    );
    assert!(!report.has_failures());
    assert_eq!(report.summary().bytes_transferred, 16);
    assert_eq!(fs::read(remote.path().join("nested/deep/b.bin")).unwrap(), b"bravo bytes");

    let again = engine.plan().await.unwrap();
    assert!(again.is_noop());
    assert!(again
        .operations
        .iter()
        .all(|op| op.action == Action::Skip && op.reason == Reason::Unchanged));
}

#[tokio::test]
async fn test_download_with_delete_mirrors_the_remote() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(remote.path(), "a.txt", b"new upstream file");
    write_file(remote.path(), "b.txt", b"longer upstream content");
    write_file(local.path(), "b.txt", b"short");
    write_file(local.path(), "stale/c.txt", b"gone upstream");

    let engine = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::RemoteToLocal,
        config(SyncOptions {
            delete: true,
            ..Default::default()
        }),
    );

    let plan = engine.plan().await.unwrap();
    assert_eq!(
        actions(&plan),
        vec![
            ("a.txt", Action::Download, Reason::NewFile),
            ("b.txt", Action::Download, Reason::SizeChanged),
            ("stale/c.txt", Action::Delete, Reason::MissingInSource),
        ]
    );

    let report = engine.execute(&plan, CancellationToken::new(), None).await.unwrap();
    assert!(!report.has_failures());
    assert_eq!(fs::read(local.path().join("b.txt")).unwrap(), b"longer upstream content");
    assert!(!local.path().join("stale/c.txt").exists());
    assert!(!local.path().join("stale").exists());

    let again = engine.plan().await.unwrap();
    assert!(again.is_noop(), "expected no work, got {:?}", actions(&again));
}

#[tokio::test]
async fn test_download_creates_missing_local_directory() {
    let parent = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(remote.path(), "w/model.bin", b"weights");
    let target = parent.path().join("not-yet");

    let engine = SyncEngine::new(
        Arc::new(LocalBackend::new(&target)),
        Arc::new(LocalBackend::new(remote.path())),
        Direction::RemoteToLocal,
        config(SyncOptions::default()),
    );

    let (plan, report) = engine.sync(CancellationToken::new()).await.unwrap();
    assert_eq!(actions(&plan), vec![("w/model.bin", Action::Download, Reason::NewFile)]);
    assert!(!report.has_failures());
    assert_eq!(fs::read(target.join("w/model.bin")).unwrap(), b"weights");
}

#[tokio::test]
async fn test_missing_source_directory_is_fatal() {
    let parent = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();

    let engine = SyncEngine::new(
        Arc::new(LocalBackend::new(parent.path().join("missing"))),
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );

    let err = engine.plan().await.unwrap_err();
    assert!(matches!(err, SyncError::Listing(ListingError::RootNotFound { .. })), "{err}");
}

#[tokio::test]
async fn test_conflicting_options_fail_before_listing() {
    let local = TempDir::new().unwrap();
    let engine = SyncEngine::new(
        Arc::new(LocalBackend::new(local.path().join("missing"))),
        Arc::new(LocalBackend::new(local.path())),
        Direction::LocalToRemote,
        config(SyncOptions {
            existing: true,
            ignore_existing: true,
            ..Default::default()
        }),
    );

    assert!(matches!(engine.plan().await, Err(SyncError::InvalidOptions(_))));
}

#[tokio::test]
async fn test_memory_bucket_upload_round_trip() {
    let local = TempDir::new().unwrap();
    write_file(local.path(), "cfg/app.toml", b"key = 1");
    write_file(local.path(), "data.csv", b"a,b\n1,2\n");

    let bucket: Arc<dyn StorageBackend> = Arc::new(BucketBackend::memory("mirror").unwrap());
    let engine = engine(
        &local,
        bucket.clone(),
        Direction::LocalToRemote,
        config(SyncOptions {
            ignore_times: true,
            ..Default::default()
        }),
    );

    let (plan, report) = engine.sync(CancellationToken::new()).await.unwrap();
    assert_eq!(plan.summary().uploads, 2);
    assert!(!report.has_failures());

    let mut listed: Vec<_> = bucket
        .list_files()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_file())
        .map(|r| (r.path, r.size))
        .collect();
    listed.sort();
    assert_eq!(
        listed,
        vec![
            ("cfg/app.toml".to_string(), Some(7)),
            ("data.csv".to_string(), Some(8))
        ]
    );

    assert!(engine.plan().await.unwrap().is_noop());
}

#[tokio::test]
async fn test_saved_plan_applies_later() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    let plans = TempDir::new().unwrap();
    write_file(local.path(), "a.txt", b"alpha");
    write_file(local.path(), "b.txt", b"bravo");

    let engine = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );
    let plan = engine.plan().await.unwrap();
    let plan_path = plans.path().join("plan.jsonl");
    write_plan(&plan, &plan_path).unwrap();

    // Files added after planning are not part of the saved plan.
    write_file(local.path(), "late.txt", b"late");

    let loaded = read_plan(&plan_path).unwrap();
    assert_eq!(loaded.operations, plan.operations);
    let report = engine.execute(&loaded, CancellationToken::new(), None).await.unwrap();
    assert!(!report.has_failures());
    assert!(remote.path().join("a.txt").exists());
    assert!(!remote.path().join("late.txt").exists());

    let rest = engine.plan().await.unwrap();
    assert_eq!(
        rest.pending_work().map(|op| op.path.as_str()).collect::<Vec<_>>(),
        vec!["late.txt"]
    );
}

#[tokio::test]
async fn test_execute_rejects_plan_for_other_direction() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(remote.path(), "a.txt", b"alpha");

    let down = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::RemoteToLocal,
        config(SyncOptions::default()),
    );
    let plan = down.plan().await.unwrap();

    let up = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );
    assert!(matches!(
        up.execute(&plan, CancellationToken::new(), None).await,
        Err(SyncError::InvalidOptions(_))
    ));
}

/// Real transfers, except one path that always fails.
struct FailOnePath {
    inner: BackendTransfer,
    path: &'static str,
}

#[async_trait]
impl TransferBackend for FailOnePath {
    async fn put_file(&self, op: &SyncOperation) -> Result<(), TransferError> {
        if op.path == self.path {
            return Err(TransferError::failed(op.path.clone(), "connection reset"));
        }
        self.inner.put_file(op).await
    }

    async fn get_file(&self, op: &SyncOperation) -> Result<(), TransferError> {
        self.inner.get_file(op).await
    }

    async fn delete_files(&self, paths: &[String]) -> Vec<BatchItem> {
        self.inner.delete_files(paths).await
    }
}

#[tokio::test]
async fn test_partial_apply_leaves_only_failed_work() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        write_file(local.path(), name, name.as_bytes());
    }

    let local_backend = Arc::new(LocalBackend::new(local.path()));
    let remote_backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(remote.path()));
    let engine = SyncEngine::new(
        local_backend.clone(),
        remote_backend.clone(),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );
    let plan = engine.plan().await.unwrap();

    let transfer = FailOnePath {
        inner: BackendTransfer::new(local_backend, remote_backend, Direction::LocalToRemote),
        path: "b.txt",
    };
    let report = Executor::new(Arc::new(transfer), ExecutorConfig::default()).run(&plan).await;

    let failed: Vec<_> = report.failures().map(|(op, _)| op.path.as_str()).collect();
    assert_eq!(failed, vec!["b.txt"]);
    assert_eq!(report.summary().uploads.succeeded, 2);

    let rest = engine.plan().await.unwrap();
    assert_eq!(
        rest.pending_work()
            .map(|op| (op.path.as_str(), op.action, op.reason))
            .collect::<Vec<_>>(),
        vec![("b.txt", Action::Upload, Reason::NewFile)]
    );
}

#[tokio::test]
async fn test_excluded_destination_files_survive_delete() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(local.path(), "keep.txt", b"keep");
    write_file(remote.path(), "keep.txt", b"keep");
    write_file(remote.path(), "old.txt", b"old");
    write_file(remote.path(), "cache/blob.tmp", b"cached");

    let mut filters = FilterRules::new();
    filters.exclude("**/*.tmp").unwrap();
    let engine = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        SyncConfig {
            filters,
            ..config(SyncOptions {
                delete: true,
                ignore_times: true,
                ..Default::default()
            })
        },
    );

    let (plan, report) = engine.sync(CancellationToken::new()).await.unwrap();
    assert_eq!(
        actions(&plan),
        vec![
            ("keep.txt", Action::Skip, Reason::Unchanged),
            ("old.txt", Action::Delete, Reason::MissingInSource),
        ]
    );
    assert!(!report.has_failures());
    assert!(!remote.path().join("old.txt").exists());
    assert!(remote.path().join("cache/blob.tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_backslash_file_name_syncs_like_any_other() {
    let local = TempDir::new().unwrap();
    let remote = TempDir::new().unwrap();
    write_file(local.path(), "ok.txt", b"ok");
    write_file(local.path(), "weird\\name.txt", b"odd");

    let engine = engine(
        &local,
        Arc::new(LocalBackend::new(remote.path())),
        Direction::LocalToRemote,
        config(SyncOptions::default()),
    );

    let (plan, report) = engine.sync(CancellationToken::new()).await.unwrap();
    assert_eq!(
        actions(&plan),
        vec![
            ("ok.txt", Action::Upload, Reason::NewFile),
            ("weird\\name.txt", Action::Upload, Reason::NewFile),
        ]
    );
    assert!(!report.has_failures());
    assert_eq!(fs::read(remote.path().join("weird\\name.txt")).unwrap(), b"odd");
    assert!(engine.plan().await.unwrap().is_noop());
}
