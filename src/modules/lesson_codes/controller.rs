use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use tracing::instrument;

use rollcall_core::AppError;
use rollcall_models::{LessonCode, StartLessonCodeDto};

use crate::middleware::auth::AuthUser;
use crate::modules::{code_kind_param, lesson_id_param};
use crate::state::AppState;
use crate::validator::ValidatedJson;

/// Start a pincode or QR token for a lesson the caller teaches.
#[instrument(skip_all)]
pub async fn start_code(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(lesson_id): Path<String>,
    ValidatedJson(dto): ValidatedJson<StartLessonCodeDto>,
) -> Result<(StatusCode, Json<LessonCode>), AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let cancel = state.request_token();

    let code = state
        .check_in
        .start_lesson_code(
            &lesson_id,
            dto.kind,
            dto.ttl_seconds.map(Duration::from_secs),
            &actor,
            &cancel,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(code)))
}

/// Replace the active code with a fresh value.
#[instrument(skip_all)]
pub async fn rotate_code(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((lesson_id, kind)): Path<(String, String)>,
) -> Result<Json<LessonCode>, AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let kind = code_kind_param(&kind)?;
    let cancel = state.request_token();

    let code = state
        .check_in
        .rotate_lesson_code(&lesson_id, kind, &actor, &cancel)
        .await?;
    Ok(Json(code))
}
