use axum::{
    Router,
    routing::{get, post, put},
};

use super::controller::{list_attendance, override_attendance, sweep_attendance};
use crate::state::AppState;

/// Mounted under `/api/lessons/{lesson_id}/attendance`.
pub fn init_attendance_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_attendance))
        .route("/sweep", post(sweep_attendance))
        .route("/{subject_id}", put(override_attendance))
}
