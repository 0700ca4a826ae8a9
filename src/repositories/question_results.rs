use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::models::QuestionResult;

pub(crate) const COLUMNS: &str = "\
    question_number, max_marks, obtained_marks, status, graded_by, student_answer, \
    matched_keywords, missing_keywords, similarity_score, confidence, feedback, feedback_localized";

pub(crate) async fn insert_all(
    tx: &mut Transaction<'_, Postgres>,
    submission_id: &str,
    results: &[QuestionResult],
) -> Result<(), sqlx::Error> {
    for result in results {
        sqlx::query(
            "INSERT INTO question_results (
                submission_id, question_number, max_marks, obtained_marks, status, graded_by,
                student_answer, matched_keywords, missing_keywords, similarity_score, confidence,
                feedback, feedback_localized
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(submission_id)
        .bind(result.question_number)
        .bind(result.max_marks)
        .bind(result.obtained_marks)
        .bind(result.status)
        .bind(result.graded_by)
        .bind(&result.student_answer)
        .bind(Json(&result.matched_keywords.0))
        .bind(Json(&result.missing_keywords.0))
        .bind(result.similarity_score)
        .bind(result.confidence)
        .bind(&result.feedback)
        .bind(&result.feedback_localized)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub(crate) async fn list_for_submission(
    pool: &PgPool,
    submission_id: &str,
) -> Result<Vec<QuestionResult>, sqlx::Error> {
    sqlx::query_as::<_, QuestionResult>(&format!(
        "SELECT {COLUMNS} FROM question_results
         WHERE submission_id = $1
         ORDER BY question_number"
    ))
    .bind(submission_id)
    .fetch_all(pool)
    .await
}
