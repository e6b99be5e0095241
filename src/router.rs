use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::logging::logging_middleware;
use crate::metrics::metrics_middleware;
use crate::modules::attendance::init_attendance_router;
use crate::modules::auth::init_auth_router;
use crate::modules::check_in::init_check_in_router;
use crate::modules::lesson_codes::init_lesson_codes_router;
use crate::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn init_lessons_router() -> Router<AppState> {
    Router::new()
        .nest("/{lesson_id}/codes", init_lesson_codes_router())
        .nest("/{lesson_id}/check-in", init_check_in_router())
        .nest("/{lesson_id}/attendance", init_attendance_router())
}

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest(
            "/api",
            Router::new()
                .nest("/auth", init_auth_router())
                .nest("/lessons", init_lessons_router()),
        )
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}
