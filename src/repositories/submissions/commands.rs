use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{QuestionResult, Submission};
use crate::db::types::SubmissionStatus;
use crate::repositories::question_results;

use super::types::CompletionUpdate;

pub(crate) async fn insert(pool: &PgPool, submission: &Submission) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO submissions (
            id, answer_key_id, owner_id, student_name, student_id, source_file_key,
            source_file_name, source_mime_type, source_file_size, source_file_sha256, status,
            total_marks, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(&submission.id)
    .bind(&submission.answer_key_id)
    .bind(&submission.owner_id)
    .bind(&submission.student_name)
    .bind(&submission.student_id)
    .bind(&submission.source_file_key)
    .bind(&submission.source_file_name)
    .bind(&submission.source_mime_type)
    .bind(submission.source_file_size)
    .bind(&submission.source_file_sha256)
    .bind(submission.status)
    .bind(submission.total_marks)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Conditional pending -> processing. Returns false when another dispatcher
/// got there first or the submission is already terminal.
pub(crate) async fn mark_processing(
    pool: &PgPool,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             processing_started_at = $2,
             updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(SubmissionStatus::Processing)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Pending)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

pub(crate) async fn save_extracted_text(
    pool: &PgPool,
    id: &str,
    text: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET extracted_text = $1,
             updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(text)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Processing)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes every result and the aggregate in one transaction. Nothing is
/// written unless the submission is still processing.
pub(crate) async fn complete(
    pool: &PgPool,
    id: &str,
    results: &[QuestionResult],
    update: CompletionUpdate<'_>,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             obtained_marks = $2,
             total_marks = $3,
             percentage = $4,
             letter_grade = $5,
             overall_feedback = $6,
             overall_feedback_localized = $7,
             completed_at = $8,
             updated_at = $8
         WHERE id = $9 AND status = $10",
    )
    .bind(SubmissionStatus::Completed)
    .bind(update.obtained_marks)
    .bind(update.total_marks)
    .bind(update.percentage)
    .bind(update.letter_grade)
    .bind(update.overall_feedback)
    .bind(update.overall_feedback_localized)
    .bind(update.completed_at)
    .bind(id)
    .bind(SubmissionStatus::Processing)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    question_results::insert_all(&mut tx, id, results).await?;
    tx.commit().await?;
    Ok(true)
}

pub(crate) async fn fail(
    pool: &PgPool,
    id: &str,
    reason: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             overall_feedback = $2,
             overall_feedback_localized = NULL,
             completed_at = $3,
             updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(SubmissionStatus::Failed)
    .bind(reason)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Processing)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated > 0)
}

pub(crate) async fn fail_stale_processing(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
    reason: &str,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE submissions
         SET status = $1,
             overall_feedback = $2,
             overall_feedback_localized = NULL,
             completed_at = $3,
             updated_at = $3
         WHERE status = $4
           AND processing_started_at IS NOT NULL
           AND processing_started_at < $5",
    )
    .bind(SubmissionStatus::Failed)
    .bind(reason)
    .bind(now)
    .bind(SubmissionStatus::Processing)
    .bind(started_before)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(updated)
}

pub(crate) async fn delete_unless_processing(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM submissions WHERE id = $1 AND status <> $2")
        .bind(id)
        .bind(SubmissionStatus::Processing)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(deleted)
}
