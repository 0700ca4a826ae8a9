use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

use super::types::{SubmissionFilter, COLUMNS};

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &SubmissionFilter,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS}
         FROM submissions
         WHERE ($1::text IS NULL OR owner_id = $1)
           AND ($2::text IS NULL OR answer_key_id = $2)
           AND ($3::submissionstatus IS NULL OR status = $3)
         ORDER BY created_at DESC"
    ))
    .bind(filter.owner_id.as_deref())
    .bind(filter.answer_key_id.as_deref())
    .bind(filter.status)
    .fetch_all(pool)
    .await
}

/// Oldest pending submission created before `created_before`. Claiming is
/// left to the conditional pending->processing update.
pub(crate) async fn next_pending_id(
    pool: &PgPool,
    created_before: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id
         FROM submissions
         WHERE status = $1 AND created_at <= $2
         ORDER BY created_at
         LIMIT 1",
    )
    .bind(SubmissionStatus::Pending)
    .bind(created_before)
    .fetch_optional(pool)
    .await
}
