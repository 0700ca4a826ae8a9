mod handlers;

use axum::{routing::get, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_answer_keys).post(handlers::create_answer_key))
        .route("/:answer_key_id", get(handlers::get_answer_key).delete(handlers::delete_answer_key))
        .route("/:answer_key_id/submissions", get(handlers::list_answer_key_submissions))
}

#[cfg(test)]
mod tests;
