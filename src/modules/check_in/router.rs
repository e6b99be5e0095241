use axum::{Router, routing::post};

use super::controller::submit_code;
use crate::state::AppState;

/// Mounted under `/api/lessons/{lesson_id}/check-in`.
pub fn init_check_in_router() -> Router<AppState> {
    Router::new().route("/", post(submit_code))
}
