use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_paper_upload;
use crate::core::state::AppState;
use crate::db::models::Submission;
use crate::repositories::store::{DeleteOutcome, SubmissionFilter};
use crate::services::paper_checking::NewPaper;
use crate::schemas::submission::{SubmissionListQuery, SubmissionResponse, SubmissionSummary};

const MAX_TEXT_FIELD_CHARS: usize = 255;

struct UploadedFile {
    name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct SubmissionForm {
    answer_key_id: Option<String>,
    student_name: Option<String>,
    student_id: Option<String>,
    file: Option<UploadedFile>,
}

async fn read_form(mut multipart: Multipart, max_bytes: u64) -> Result<SubmissionForm, ApiError> {
    let mut form = SubmissionForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
                {
                    if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                        return Err(ApiError::PayloadTooLarge(format!(
                            "File size exceeds {}MB limit",
                            max_bytes / (1024 * 1024)
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                form.file = Some(UploadedFile { name: file_name, content_type, bytes });
            }
            "answer_key_id" | "student_name" | "student_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {name} field")))?;
                let value = value.trim().to_string();
                if value.chars().count() > MAX_TEXT_FIELD_CHARS {
                    return Err(ApiError::BadRequest(format!(
                        "{name} must be at most {MAX_TEXT_FIELD_CHARS} characters"
                    )));
                }
                let value = (!value.is_empty()).then_some(value);
                match name.as_str() {
                    "answer_key_id" => form.answer_key_id = value,
                    "student_name" => form.student_name = value,
                    _ => form.student_id = value,
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn fetch_owned_submission(
    state: &AppState,
    owner_id: &str,
    submission_id: &str,
) -> Result<Submission, ApiError> {
    state
        .store()
        .find_submission(submission_id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to fetch submission"))?
        .filter(|submission| submission.owner_id == owner_id)
        .ok_or(ApiError::NotFound("Submission not found"))
}

pub(super) async fn submit_paper(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let storage_settings = state.settings().storage();
    let max_bytes = storage_settings.max_upload_size_mb * 1024 * 1024;
    let form = read_form(multipart, max_bytes).await?;

    let answer_key_id = form
        .answer_key_id
        .ok_or_else(|| ApiError::BadRequest("answer_key_id is required".to_string()))?;
    let file = form.file.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;
    if file.bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let mime_type = validate_paper_upload(
        &file.name,
        file.content_type.as_deref(),
        &storage_settings.allowed_extensions,
    )?;

    let submission = state
        .checker()
        .submit_paper(NewPaper {
            answer_key_id,
            owner_id: user_id,
            student_name: form.student_name,
            student_id: form.student_id,
            file_name: file.name,
            mime_type,
            bytes: file.bytes,
        })
        .await?;

    if state.settings().grading().inline_dispatch {
        state.checker().spawn_processing(submission.id.clone());
    }

    Ok((StatusCode::ACCEPTED, Json(SubmissionResponse::from(submission))))
}

pub(super) async fn list_submissions(
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<Vec<SubmissionSummary>>, ApiError> {
    let filter =
        SubmissionFilter { owner_id: Some(user_id), answer_key_id: None, status: query.status };
    let submissions = state
        .store()
        .list_submissions(&filter)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to list submissions"))?;

    Ok(Json(submissions.into_iter().map(SubmissionSummary::from).collect()))
}

pub(super) async fn get_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = fetch_owned_submission(&state, &user_id, &submission_id).await?;
    Ok(Json(SubmissionResponse::from(submission)))
}

pub(super) async fn delete_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user_id): CurrentUser,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let submission = fetch_owned_submission(&state, &user_id, &submission_id).await?;

    let outcome = state
        .store()
        .delete_submission(&submission.id)
        .await
        .map_err(|e| ApiError::internal(format!("{e:#}"), "Failed to delete submission"))?;

    match outcome {
        DeleteOutcome::Deleted => {
            if let Err(err) = state.storage().delete(&submission.source_file_key).await {
                tracing::warn!(
                    submission_id = %submission.id,
                    file_key = %submission.source_file_key,
                    error = %err,
                    "Failed to remove stored paper"
                );
            }
            tracing::info!(submission_id = %submission.id, "Submission deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteOutcome::NotFound => Err(ApiError::NotFound("Submission not found")),
        DeleteOutcome::InUse => Err(ApiError::Conflict(
            "Submission is being processed and cannot be deleted".to_string(),
        )),
    }
}
