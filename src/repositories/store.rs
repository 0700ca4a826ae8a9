use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{AnswerKey, QuestionResult, Submission};
use crate::db::types::SubmissionStatus;
use crate::repositories::{answer_keys, health, question_results, submissions};
use crate::services::aggregation::GradeSummary;

pub(crate) use crate::repositories::submissions::SubmissionFilter;

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Still referenced or mid-pipeline.
    InUse,
}

/// Persistence seam for answer keys and submissions. Every status change is
/// conditional on the current status, so implementations reject transitions
/// out of terminal states.
#[async_trait]
pub(crate) trait GradingStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_answer_key(&self, key: &AnswerKey) -> Result<()>;
    async fn find_answer_key(&self, id: &str) -> Result<Option<AnswerKey>>;
    async fn list_answer_keys(&self, owner_id: &str, search: Option<&str>)
        -> Result<Vec<AnswerKey>>;
    async fn delete_answer_key(&self, id: &str) -> Result<DeleteOutcome>;

    async fn insert_submission(&self, submission: &Submission) -> Result<()>;
    /// Loads the submission together with its question results.
    async fn find_submission(&self, id: &str) -> Result<Option<Submission>>;
    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>>;
    async fn delete_submission(&self, id: &str) -> Result<DeleteOutcome>;

    async fn mark_processing(&self, id: &str, now: PrimitiveDateTime) -> Result<bool>;
    async fn save_extracted_text(&self, id: &str, text: &str, now: PrimitiveDateTime)
        -> Result<()>;
    async fn complete(
        &self,
        id: &str,
        results: &[QuestionResult],
        summary: &GradeSummary,
        now: PrimitiveDateTime,
    ) -> Result<bool>;
    async fn fail(&self, id: &str, reason: &str, now: PrimitiveDateTime) -> Result<bool>;

    async fn next_pending(&self, created_before: PrimitiveDateTime) -> Result<Option<String>>;
    async fn fail_stale_processing(
        &self,
        started_before: PrimitiveDateTime,
        reason: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64>;
}

#[derive(Clone)]
pub(crate) struct PgGradingStore {
    pool: PgPool,
}

impl PgGradingStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == FOREIGN_KEY_VIOLATION)
}

#[async_trait]
impl GradingStore for PgGradingStore {
    async fn ping(&self) -> Result<()> {
        health::ping(&self.pool).await.context("Database ping failed")
    }

    async fn insert_answer_key(&self, key: &AnswerKey) -> Result<()> {
        answer_keys::insert(&self.pool, key).await.context("Failed to insert answer key")
    }

    async fn find_answer_key(&self, id: &str) -> Result<Option<AnswerKey>> {
        answer_keys::find_by_id(&self.pool, id).await.context("Failed to fetch answer key")
    }

    async fn list_answer_keys(
        &self,
        owner_id: &str,
        search: Option<&str>,
    ) -> Result<Vec<AnswerKey>> {
        answer_keys::list_by_owner(&self.pool, owner_id, search)
            .await
            .context("Failed to list answer keys")
    }

    async fn delete_answer_key(&self, id: &str) -> Result<DeleteOutcome> {
        let references = answer_keys::count_submissions(&self.pool, id)
            .await
            .context("Failed to count answer key submissions")?;
        if references > 0 {
            return Ok(DeleteOutcome::InUse);
        }

        match answer_keys::delete(&self.pool, id).await {
            Ok(0) => Ok(DeleteOutcome::NotFound),
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) if is_foreign_key_violation(&err) => Ok(DeleteOutcome::InUse),
            Err(err) => Err(err).context("Failed to delete answer key"),
        }
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        submissions::insert(&self.pool, submission).await.context("Failed to insert submission")
    }

    async fn find_submission(&self, id: &str) -> Result<Option<Submission>> {
        let Some(mut submission) = submissions::find_by_id(&self.pool, id)
            .await
            .context("Failed to fetch submission")?
        else {
            return Ok(None);
        };

        if submission.status == SubmissionStatus::Completed {
            submission.results = question_results::list_for_submission(&self.pool, id)
                .await
                .context("Failed to fetch question results")?;
        }
        Ok(Some(submission))
    }

    async fn list_submissions(&self, filter: &SubmissionFilter) -> Result<Vec<Submission>> {
        submissions::list(&self.pool, filter).await.context("Failed to list submissions")
    }

    async fn delete_submission(&self, id: &str) -> Result<DeleteOutcome> {
        let Some(existing) = submissions::find_by_id(&self.pool, id)
            .await
            .context("Failed to fetch submission")?
        else {
            return Ok(DeleteOutcome::NotFound);
        };
        if existing.status == SubmissionStatus::Processing {
            return Ok(DeleteOutcome::InUse);
        }

        let deleted = submissions::delete_unless_processing(&self.pool, id)
            .await
            .context("Failed to delete submission")?;
        Ok(if deleted > 0 { DeleteOutcome::Deleted } else { DeleteOutcome::InUse })
    }

    async fn mark_processing(&self, id: &str, now: PrimitiveDateTime) -> Result<bool> {
        submissions::mark_processing(&self.pool, id, now)
            .await
            .context("Failed to mark submission processing")
    }

    async fn save_extracted_text(
        &self,
        id: &str,
        text: &str,
        now: PrimitiveDateTime,
    ) -> Result<()> {
        submissions::save_extracted_text(&self.pool, id, text, now)
            .await
            .context("Failed to save extracted text")
    }

    async fn complete(
        &self,
        id: &str,
        results: &[QuestionResult],
        summary: &GradeSummary,
        now: PrimitiveDateTime,
    ) -> Result<bool> {
        let update = submissions::CompletionUpdate {
            obtained_marks: summary.obtained_marks,
            total_marks: summary.total_marks,
            percentage: summary.percentage,
            letter_grade: summary.letter_grade.as_str(),
            overall_feedback: &summary.overall_feedback,
            overall_feedback_localized: summary.overall_feedback_localized.as_deref(),
            completed_at: now,
        };
        submissions::complete(&self.pool, id, results, update)
            .await
            .context("Failed to persist grading results")
    }

    async fn fail(&self, id: &str, reason: &str, now: PrimitiveDateTime) -> Result<bool> {
        submissions::fail(&self.pool, id, reason, now)
            .await
            .context("Failed to mark submission failed")
    }

    async fn next_pending(&self, created_before: PrimitiveDateTime) -> Result<Option<String>> {
        submissions::next_pending_id(&self.pool, created_before)
            .await
            .context("Failed to fetch next pending submission")
    }

    async fn fail_stale_processing(
        &self,
        started_before: PrimitiveDateTime,
        reason: &str,
        now: PrimitiveDateTime,
    ) -> Result<u64> {
        submissions::fail_stale_processing(&self.pool, started_before, reason, now)
            .await
            .context("Failed to fail stale submissions")
    }
}
