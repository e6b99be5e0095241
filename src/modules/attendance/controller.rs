use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use tracing::instrument;

use rollcall_core::AppError;
use rollcall_models::{AttendanceRecord, OverrideAttendanceDto};

use crate::middleware::auth::AuthUser;
use crate::modules::{lesson_id_param, subject_id_param};
use crate::state::AppState;
use crate::validator::ValidatedJson;

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub marked_absent: usize,
}

/// Every roster member's record, Pending included.
#[instrument(skip_all)]
pub async fn list_attendance(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(lesson_id): Path<String>,
) -> Result<Json<Vec<AttendanceRecord>>, AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let cancel = state.request_token();

    let records = state
        .check_in
        .lesson_attendance(&lesson_id, &actor, &cancel)
        .await?;
    Ok(Json(records))
}

#[instrument(skip_all)]
pub async fn override_attendance(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((lesson_id, subject_id)): Path<(String, String)>,
    ValidatedJson(dto): ValidatedJson<OverrideAttendanceDto>,
) -> Result<Json<AttendanceRecord>, AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let subject_id = subject_id_param(subject_id)?;
    let cancel = state.request_token();

    let record = state
        .check_in
        .override_attendance(&lesson_id, &subject_id, dto.status, &actor, &cancel)
        .await?;
    Ok(Json(record))
}

/// Mark every still-pending subject absent once the lesson has ended.
#[instrument(skip_all)]
pub async fn sweep_attendance(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(lesson_id): Path<String>,
) -> Result<Json<SweepResponse>, AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let cancel = state.request_token();

    let marked_absent = state
        .check_in
        .sweep_lesson(&lesson_id, &actor, &cancel)
        .await?;
    Ok(Json(SweepResponse { marked_absent }))
}
