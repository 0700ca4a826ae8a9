use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::AnswerKey;

pub(crate) const COLUMNS: &str =
    "id, owner_id, title, subject, total_marks, items, marking_scheme, created_at, updated_at";

pub(crate) async fn insert(pool: &PgPool, key: &AnswerKey) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO answer_keys (
            id, owner_id, title, subject, total_marks, items, marking_scheme, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&key.id)
    .bind(&key.owner_id)
    .bind(&key.title)
    .bind(&key.subject)
    .bind(key.total_marks)
    .bind(Json(&key.items.0))
    .bind(Json(&key.marking_scheme.0))
    .bind(key.created_at)
    .bind(key.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<AnswerKey>, sqlx::Error> {
    sqlx::query_as::<_, AnswerKey>(&format!("SELECT {COLUMNS} FROM answer_keys WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_by_owner(
    pool: &PgPool,
    owner_id: &str,
    search: Option<&str>,
) -> Result<Vec<AnswerKey>, sqlx::Error> {
    let pattern = search.map(|term| format!("%{}%", escape_like(term)));
    sqlx::query_as::<_, AnswerKey>(&format!(
        "SELECT {COLUMNS} FROM answer_keys
         WHERE owner_id = $1
           AND ($2::text IS NULL OR title ILIKE $2 ESCAPE '\\')
         ORDER BY created_at DESC"
    ))
    .bind(owner_id)
    .bind(pattern)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_submissions(pool: &PgPool, id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE answer_key_id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn delete(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM answer_keys WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected())
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("Physics"), "Physics");
    }
}
