use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::api::errors::ApiError;
use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_prefix: state.settings().api().api_v1_str.clone(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let (status_code, status) = match state.store().ping().await {
        Ok(()) => {
            components.insert("database".to_string(), "healthy".to_string());
            (StatusCode::OK, "healthy")
        }
        Err(err) => {
            tracing::error!(error = %err, "Health check failed");
            components.insert("database".to_string(), "unhealthy".to_string());
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        status_code,
        Json(HealthResponse {
            service: "papercheck".to_string(),
            status: status.to_string(),
            components,
        }),
    )
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if !state.settings().telemetry().prometheus_enabled {
        return Err(ApiError::NotFound("Metrics are disabled"));
    }

    match metrics::render() {
        Some(body) => Ok(([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)),
        None => Err(ApiError::ServiceUnavailable("Metrics recorder not installed".to_string())),
    }
}
