mod handlers;

use axum::{extract::DefaultBodyLimit, routing::get, Router};

use crate::core::state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_submissions).post(handlers::submit_paper))
        .route("/:submission_id", get(handlers::get_submission).delete(handlers::delete_submission))
        .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD_BYTES))
}
