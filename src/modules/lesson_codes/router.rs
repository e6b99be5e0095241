use axum::{Router, routing::post};

use super::controller::{rotate_code, start_code};
use crate::state::AppState;

/// Mounted under `/api/lessons/{lesson_id}/codes`.
pub fn init_lesson_codes_router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_code))
        .route("/{kind}/rotate", post(rotate_code))
}
