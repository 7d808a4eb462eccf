//! Integration tests for the parallel task runner.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;

use waypoint::domain::models::{ExpectedOutcome, TaskStatus, TaskVerdict};
use waypoint::services::{ParallelTaskRunner, TaskError};

#[tokio::test]
async fn resubmitting_a_known_id_is_a_no_op() {
    let runner = ParallelTaskRunner::new();
    let executions = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let executions = Arc::clone(&executions);
        runner
            .submit("restart-controller-1", ExpectedOutcome::Success, async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
    }

    let verdict = runner.await_result("restart-controller-1").await.unwrap();
    assert_eq!(verdict, TaskVerdict::Success);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expected_success_that_fails_propagates_the_error() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("verify-compute-0", ExpectedOutcome::Success, async {
            Err(anyhow!("service nova-compute is down"))
        })
        .await;

    let err = runner.await_result("verify-compute-0").await.unwrap_err();
    match err {
        TaskError::Failed { id, message } => {
            assert_eq!(id, "verify-compute-0");
            assert!(message.contains("nova-compute is down"));
        }
        other => panic!("expected a failed-task error, got {other:?}"),
    }
}

#[tokio::test]
async fn expected_failure_captures_the_message_instead_of_propagating() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("negative-restart", ExpectedOutcome::Failure, async {
            Err(anyhow!("permission denied"))
        })
        .await;

    let verdict = runner.await_result("negative-restart").await.unwrap();
    assert_eq!(verdict.failure_message(), Some("permission denied"));
}

#[tokio::test]
async fn expected_failure_that_succeeds_is_flagged() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("negative-that-passes", ExpectedOutcome::Failure, async { Ok(()) })
        .await;

    let verdict = runner.await_result("negative-that-passes").await.unwrap();
    assert_eq!(verdict, TaskVerdict::UnexpectedSuccess);
}

#[tokio::test(start_paused = true)]
async fn concurrent_awaiters_all_observe_the_verdict() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("shared-restart", ExpectedOutcome::Success, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

    // Two clones of the runner race to collect the same task.
    let mut awaiters = Vec::new();
    for _ in 0..2 {
        let runner = runner.clone();
        awaiters.push(tokio::spawn(async move {
            runner.await_result("shared-restart").await
        }));
    }
    for awaiter in awaiters {
        let verdict = awaiter.await.unwrap().unwrap();
        assert_eq!(verdict, TaskVerdict::Success);
    }
}

#[tokio::test]
async fn verdicts_are_stable_across_repeated_awaits() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("repeat", ExpectedOutcome::Failure, async {
            Err(anyhow!("boom"))
        })
        .await;

    let first = runner.await_result("repeat").await.unwrap();
    let second = runner.await_result("repeat").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn status_reflects_running_and_finished_tasks() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("quick", ExpectedOutcome::Success, async { Ok(()) })
        .await;
    runner
        .submit("slow", ExpectedOutcome::Success, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;

    runner.await_result("quick").await.unwrap();
    let status = runner.status().await;
    assert_eq!(status.get("quick"), Some(&TaskStatus::Finished));
    assert_eq!(status.get("slow"), Some(&TaskStatus::Started));
    assert!(!runner.all_finished().await);

    runner.stop("slow").await;
    let status = runner.status().await;
    assert_eq!(status.get("slow"), Some(&TaskStatus::Stopped));
    assert!(runner.all_finished().await);
}

#[tokio::test]
async fn stopped_tasks_report_as_stopped_on_await() {
    let runner = ParallelTaskRunner::new();
    runner
        .submit("aborted", ExpectedOutcome::Success, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
    runner.stop("aborted").await;

    let err = runner.await_result("aborted").await.unwrap_err();
    assert!(matches!(err, TaskError::Stopped { .. }));
}

#[tokio::test]
async fn unknown_ids_are_rejected() {
    let runner = ParallelTaskRunner::new();
    let err = runner.await_result("never-submitted").await.unwrap_err();
    assert!(matches!(err, TaskError::Unknown(_)));
}
