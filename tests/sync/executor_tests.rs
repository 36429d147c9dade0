// Tests for the plan executor

use crate::common::{delete, plan, skip, upload, RecordingTransfer};
use bucketsync::sync::{
    execute, Action, ExecutionProgress, Executor, ExecutorConfig, OperationState,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(concurrency: usize, delete_batch_size: usize) -> ExecutorConfig {
    ExecutorConfig {
        concurrency,
        delete_batch_size,
        max_reported_errors: 10,
    }
}

fn states(report: &bucketsync::sync::ExecutionReport) -> Vec<(&str, &OperationState)> {
    report
        .outcomes
        .iter()
        .map(|o| (o.operation.path.as_str(), &o.state))
        .collect()
}

#[tokio::test]
async fn test_every_operation_succeeds() {
    let transfer = Arc::new(RecordingTransfer::default());
    let plan = plan(vec![skip("a.txt"), upload("b.bin", 10), upload("c.bin", 20), delete("d.bin")]);

    let report = execute(&plan, transfer.clone(), 4).await;

    assert!(report.outcomes.iter().all(|o| o.state == OperationState::Succeeded));
    assert!(!report.has_failures());
    assert!(!report.cancelled);
    assert_eq!(transfer.transferred_sorted(), vec!["b.bin", "c.bin"]);
    assert_eq!(*transfer.delete_batches.lock(), vec![vec!["d.bin".to_string()]]);

    let summary = report.summary();
    assert_eq!(summary.uploads.succeeded, 2);
    assert_eq!(summary.deletes.succeeded, 1);
    assert_eq!(summary.skips.succeeded, 1);
    assert_eq!(summary.bytes_transferred, 30);
}

#[tokio::test]
async fn test_transfer_failure_does_not_stop_the_run() {
    let transfer = Arc::new(RecordingTransfer::failing(["bad.bin"]));
    let plan = plan(vec![upload("a.bin", 1), upload("bad.bin", 2), upload("c.bin", 3)]);

    let report = execute(&plan, transfer.clone(), 1).await;

    assert_eq!(transfer.transferred_sorted(), vec!["a.bin", "c.bin"]);
    let failures: Vec<_> = report.failures().map(|(op, _)| op.path.as_str()).collect();
    assert_eq!(failures, vec!["bad.bin"]);

    let summary = report.summary();
    assert_eq!(summary.uploads.succeeded, 2);
    assert_eq!(summary.uploads.failed, 1);
    assert_eq!(summary.bytes_transferred, 4);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].contains("bad.bin"));
    assert!(summary.errors[0].contains("simulated failure"));
}

#[tokio::test]
async fn test_partial_batch_delete_is_decomposed_per_path() {
    let transfer = Arc::new(RecordingTransfer::failing(["c2"]));
    let plan = plan(vec![delete("c1"), delete("c2"), delete("c3")]);

    let report = Executor::new(transfer.clone(), config(2, 2)).run(&plan).await;

    assert_eq!(
        *transfer.delete_batches.lock(),
        vec![
            vec!["c1".to_string(), "c2".to_string()],
            vec!["c3".to_string()]
        ]
    );
    assert_eq!(report.outcomes[0].state, OperationState::Succeeded);
    assert!(matches!(
        &report.outcomes[1].state,
        OperationState::Failed { error } if error.contains("access denied")
    ));
    assert_eq!(report.outcomes[2].state, OperationState::Succeeded);

    let summary = report.summary();
    assert_eq!(summary.deletes.succeeded, 2);
    assert_eq!(summary.deletes.failed, 1);
    assert_eq!(summary.bytes_transferred, 0);
}

#[tokio::test]
async fn test_unreported_batch_path_counts_as_failed() {
    let transfer = Arc::new(RecordingTransfer {
        unreported_paths: ["lost".to_string()].into_iter().collect(),
        ..Default::default()
    });
    let plan = plan(vec![delete("kept"), delete("lost")]);

    let report = Executor::new(transfer, config(1, 10)).run(&plan).await;

    assert_eq!(report.outcomes[0].state, OperationState::Succeeded);
    assert!(matches!(report.outcomes[1].state, OperationState::Failed { .. }));
}

#[tokio::test]
async fn test_worker_pool_is_bounded() {
    let transfer = Arc::new(RecordingTransfer {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let ops = (0..12).map(|i| upload(&format!("f{i:02}"), 1)).collect();
    let plan = plan(ops);

    let report = Executor::new(transfer.clone(), config(3, 100)).run(&plan).await;

    assert_eq!(report.summary().uploads.succeeded, 12);
    let max = transfer.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "max in flight was {max}");
    assert!(max > 1, "transfers never overlapped");
}

#[tokio::test]
async fn test_cancel_before_start_leaves_everything_pending() {
    let transfer = Arc::new(RecordingTransfer::default());
    let plan = plan(vec![skip("a"), upload("b", 1), delete("c")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Executor::new(transfer.clone(), config(2, 10))
        .with_cancellation(cancel)
        .run(&plan)
        .await;

    assert!(report.cancelled);
    assert!(transfer.transferred.lock().is_empty());
    assert!(transfer.delete_batches.lock().is_empty());
    assert_eq!(
        states(&report),
        vec![
            ("a", &OperationState::Succeeded),
            ("b", &OperationState::Pending),
            ("c", &OperationState::Pending),
        ]
    );
    let summary = report.summary();
    assert_eq!(summary.total_pending(), 2);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn test_cancel_mid_run_lets_in_flight_finish() {
    let cancel = CancellationToken::new();
    let transfer = Arc::new(RecordingTransfer {
        cancel_on_first_transfer: Some(cancel.clone()),
        delay: Duration::from_millis(10),
        ..Default::default()
    });
    let plan = plan(vec![upload("a", 1), upload("b", 1), upload("c", 1), upload("d", 1)]);

    let report = Executor::new(transfer.clone(), config(1, 10))
        .with_cancellation(cancel)
        .run(&plan)
        .await;

    assert!(report.cancelled);
    assert_eq!(transfer.transferred_sorted(), vec!["a"]);
    assert_eq!(report.outcomes[0].state, OperationState::Succeeded);
    assert_eq!(report.pending().count(), 3);
}

#[tokio::test]
async fn test_progress_callback_sees_every_completion() {
    let transfer = Arc::new(RecordingTransfer::failing(["b"]));
    let seen: Arc<Mutex<Vec<ExecutionProgress>>> = Arc::default();
    let sink = seen.clone();
    let plan = plan(vec![skip("s"), upload("a", 5), upload("b", 7), delete("c")]);

    Executor::new(transfer, config(2, 10))
        .with_progress(Arc::new(move |p: &ExecutionProgress| sink.lock().push(p.clone())))
        .run(&plan)
        .await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|p| p.total == 3));
    let last = seen.iter().max_by_key(|p| p.completed).unwrap();
    assert_eq!(last.completed, 3);
    assert_eq!(last.bytes_done, 5);
}

#[tokio::test]
async fn test_error_list_is_capped() {
    let transfer = Arc::new(RecordingTransfer::failing(["a", "b", "c"]));
    let plan = plan(vec![upload("a", 1), upload("b", 1), upload("c", 1)]);
    let config = ExecutorConfig {
        max_reported_errors: 2,
        ..config(1, 10)
    };

    let summary = Executor::new(transfer, config).run(&plan).await.summary();

    assert_eq!(summary.total_failed(), 3);
    assert_eq!(summary.errors.len(), 2);
    assert_eq!(summary.tally(Action::Upload).failed, 3);
}
