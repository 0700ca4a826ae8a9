use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::paper_checking::CheckerError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    BadRequest(String),
    NotFound(&'static str),
    Conflict(String),
    PayloadTooLarge(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<CheckerError> for ApiError {
    fn from(err: CheckerError) -> Self {
        match err {
            CheckerError::AnswerKeyNotFound => ApiError::NotFound("Answer key not found"),
            CheckerError::SubmissionNotFound => ApiError::NotFound("Submission not found"),
            CheckerError::InvalidRubric(rubric) => ApiError::BadRequest(rubric.to_string()),
            CheckerError::Storage(source) => {
                ApiError::internal(format!("{source:#}"), "Failed to store uploaded paper")
            }
            CheckerError::Persistence(source) => {
                ApiError::internal(format!("{source:#}"), "Database operation failed")
            }
        }
    }
}

fn error_response(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = error_response(StatusCode::UNAUTHORIZED, message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::BadRequest(message) => error_response(StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => {
                error_response(StatusCode::NOT_FOUND, message.to_string())
            }
            ApiError::Conflict(message) => error_response(StatusCode::CONFLICT, message),
            ApiError::PayloadTooLarge(message) => {
                error_response(StatusCode::PAYLOAD_TOO_LARGE, message)
            }
            ApiError::ServiceUnavailable(message) => {
                tracing::error!(error = %message, "Service unavailable");
                error_response(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}
