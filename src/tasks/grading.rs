use anyhow::{Context, Result};
use time::Duration;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::core::time::{primitive_ago, primitive_now_utc as now_primitive};

pub(crate) const INTERRUPTED_REASON: &str = "Processing interrupted";

/// Processes the oldest PENDING submission past the grace period. Returns
/// false when there was nothing to pick up.
pub(crate) async fn dispatch_next_pending(state: &AppState) -> Result<bool> {
    let grace = state.settings().grading().pending_grace_seconds;
    let cutoff = primitive_ago(Duration::seconds(grace as i64));

    let Some(submission_id) = state
        .store()
        .next_pending(cutoff)
        .await
        .context("Failed to look up pending submissions")?
    else {
        return Ok(false);
    };

    tracing::info!(submission_id = %submission_id, "Dispatching pending submission");
    state
        .checker()
        .process_submission(&submission_id)
        .await
        .with_context(|| format!("Failed to process submission {submission_id}"))?;

    Ok(true)
}

/// PROCESSING rows older than the stale window never finish on their own;
/// they move to FAILED and must be resubmitted.
pub(crate) async fn fail_stale_submissions(state: &AppState) -> Result<u64> {
    let minutes = state.settings().grading().stale_after_minutes;
    let cutoff = primitive_ago(Duration::minutes(minutes as i64));

    let failed = state
        .store()
        .fail_stale_processing(cutoff, INTERRUPTED_REASON, now_primitive())
        .await
        .context("Failed to sweep stale submissions")?;

    if failed > 0 {
        tracing::warn!(failed, stale_after_minutes = minutes, "Failed stale processing submissions");
        metrics::record_stale_failures(failed);
    }

    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubmissionStatus;
    use crate::repositories::store::GradingStore;
    use crate::test_support::{pending_submission, setup_test_context};

    #[tokio::test]
    async fn pending_submissions_wait_for_grace_period() {
        let ctx = setup_test_context();
        let submission = pending_submission("teacher-1", "key-1");
        ctx.store.insert_submission(&submission).await.expect("insert");

        let dispatched = dispatch_next_pending(&ctx.state).await.expect("dispatch");
        assert!(!dispatched);
        assert_eq!(ctx.store.status_of(&submission.id), Some(SubmissionStatus::Pending));
    }

    #[tokio::test]
    async fn old_pending_submission_is_processed() {
        let ctx = setup_test_context();
        let mut submission = pending_submission("teacher-1", "key-missing");
        submission.created_at = primitive_ago(Duration::minutes(5));
        ctx.store.insert_submission(&submission).await.expect("insert");

        assert!(dispatch_next_pending(&ctx.state).await.expect("dispatch"));
        // The referenced key does not exist, so the pipeline ends in FAILED.
        assert_eq!(ctx.store.status_of(&submission.id), Some(SubmissionStatus::Failed));
        assert!(!dispatch_next_pending(&ctx.state).await.expect("second dispatch"));
    }

    #[tokio::test]
    async fn stale_processing_submissions_are_failed() {
        let ctx = setup_test_context();

        let mut stale = pending_submission("teacher-1", "key-1");
        stale.status = SubmissionStatus::Processing;
        stale.processing_started_at = Some(primitive_ago(Duration::hours(2)));
        ctx.store.insert_submission(&stale).await.expect("insert stale");

        let mut fresh = pending_submission("teacher-1", "key-1");
        fresh.status = SubmissionStatus::Processing;
        fresh.processing_started_at = Some(now_primitive());
        ctx.store.insert_submission(&fresh).await.expect("insert fresh");

        assert_eq!(fail_stale_submissions(&ctx.state).await.expect("sweep"), 1);
        assert_eq!(ctx.store.status_of(&stale.id), Some(SubmissionStatus::Failed));
        assert_eq!(ctx.store.status_of(&fresh.id), Some(SubmissionStatus::Processing));

        let failed = ctx.store.find_submission(&stale.id).await.expect("find").expect("exists");
        assert_eq!(failed.overall_feedback.as_deref(), Some(INTERRUPTED_REASON));
    }
}
