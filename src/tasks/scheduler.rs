use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};

use crate::core::shutdown::{shutdown_signal, wait_for_shutdown};
use crate::core::state::AppState;
use crate::tasks::grading;

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = spawn_workers(&state, shutdown_rx);

    tracing::info!(workers = handles.len() - 1, "Grading worker started");

    shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

pub(crate) fn spawn_workers(
    state: &AppState,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let workers = state.settings().grading().worker_concurrency.max(1);
    let mut handles = Vec::with_capacity(workers + 1);

    for worker in 0..workers {
        handles.push(tokio::spawn(pending_worker(state.clone(), worker, shutdown.clone())));
    }
    handles.push(tokio::spawn(stale_sweep_loop(state.clone(), shutdown)));

    handles
}

async fn pending_worker(state: AppState, worker: usize, shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = match grading::dispatch_next_pending(&state).await {
            Ok(true) => continue,
            Ok(false) => IDLE_POLL_INTERVAL,
            Err(err) => {
                tracing::error!(worker, error = %err, "Pending dispatch failed");
                ERROR_BACKOFF
            }
        };

        tokio::select! {
            _ = wait_for_shutdown(shutdown.clone()) => break,
            _ = sleep(pause) => {}
        }
    }
    tracing::debug!(worker, "Pending worker stopped");
}

async fn stale_sweep_loop(state: AppState, shutdown: watch::Receiver<bool>) {
    let mut tick = interval(STALE_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = wait_for_shutdown(shutdown.clone()) => break,
            _ = tick.tick() => {
                if let Err(err) = grading::fail_stale_submissions(&state).await {
                    tracing::error!(error = %err, "fail_stale_submissions failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_ago;
    use crate::db::types::SubmissionStatus;
    use crate::repositories::store::GradingStore;
    use crate::test_support::{pending_submission, setup_test_context};

    #[tokio::test]
    async fn workers_drain_backlog_and_stop_on_shutdown() {
        let ctx = setup_test_context();
        let mut submission = pending_submission("teacher-1", "key-missing");
        submission.created_at = primitive_ago(time::Duration::minutes(10));
        ctx.store.insert_submission(&submission).await.expect("insert");

        let (tx, rx) = watch::channel(false);
        let handles = spawn_workers(&ctx.state, rx);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while ctx.store.status_of(&submission.id) == Some(SubmissionStatus::Pending) {
            assert!(tokio::time::Instant::now() < deadline, "submission never dispatched");
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ctx.store.status_of(&submission.id), Some(SubmissionStatus::Failed));

        tx.send(true).expect("shutdown");
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker stops")
                .expect("join");
        }
    }
}
