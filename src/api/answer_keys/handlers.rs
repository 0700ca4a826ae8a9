use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::state::AppState;
use crate::db::models::AnswerKey;
use crate::repositories::store::{DeleteOutcome, SubmissionFilter};
use crate::schemas::answer_key::{AnswerKeyCreate, AnswerKeyListQuery, AnswerKeyResponse};
use crate::schemas::submission::SubmissionSummary;

/// Keys owned by someone else are reported as missing.
pub(super) async fn fetch_owned_key(
    state: &AppState,
    owner_id: &str,
    answer_key_id: &str,
) -> Result<AnswerKey, ApiError> {
    state
        .store()
        .find_answer_key(answer_key_id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to fetch answer key"))?
        .filter(|key| key.owner_id == owner_id)
        .ok_or(ApiError::NotFound("Answer key not found"))
}

pub(super) async fn create_answer_key(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<AnswerKeyCreate>,
) -> Result<(StatusCode, Json<AnswerKeyResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let key = state.checker().create_answer_key(&user_id, payload.into_draft()).await?;
    Ok((StatusCode::CREATED, Json(AnswerKeyResponse::from(key))))
}

pub(super) async fn list_answer_keys(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<AnswerKeyListQuery>,
) -> Result<Json<Vec<AnswerKeyResponse>>, ApiError> {
    let search = query.search.as_deref().map(str::trim).filter(|term| !term.is_empty());
    let keys = state
        .store()
        .list_answer_keys(&user_id, search)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to list answer keys"))?;

    Ok(Json(keys.into_iter().map(AnswerKeyResponse::from).collect()))
}

pub(super) async fn get_answer_key(
    Path(answer_key_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    let key = fetch_owned_key(&state, &user_id, &answer_key_id).await?;
    Ok(Json(AnswerKeyResponse::from(key)))
}

pub(super) async fn delete_answer_key(
    Path(answer_key_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    fetch_owned_key(&state, &user_id, &answer_key_id).await?;

    let outcome = state
        .store()
        .delete_answer_key(&answer_key_id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to delete answer key"))?;

    match outcome {
        DeleteOutcome::Deleted => {
            tracing::info!(answer_key_id = %answer_key_id, "Answer key deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::NotFound => Err(ApiError::NotFound("Answer key not found")),
        DeleteOutcome::InUse => Err(ApiError::Conflict(
            "Answer key is referenced by submissions and cannot be deleted".to_string(),
        )),
    }
}

pub(super) async fn list_answer_key_submissions(
    Path(answer_key_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<SubmissionSummary>>, ApiError> {
    let key = fetch_owned_key(&state, &user_id, &answer_key_id).await?;

    let filter = SubmissionFilter {
        owner_id: Some(user_id),
        answer_key_id: Some(key.id),
        status: None,
    };
    let submissions = state
        .store()
        .list_submissions(&filter)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to list submissions"))?;

    Ok(Json(submissions.into_iter().map(SubmissionSummary::from).collect()))
}
