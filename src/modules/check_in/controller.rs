use axum::Json;
use axum::extract::{Path, State};
use tracing::instrument;

use rollcall_core::AppError;
use rollcall_models::{CheckInResponse, SubmitCodeDto, ValidationOutcome};

use crate::middleware::auth::AuthUser;
use crate::modules::lesson_id_param;
use crate::state::AppState;
use crate::validator::ValidatedJson;

/// Present a code for the authenticated subject.
#[instrument(skip_all)]
pub async fn submit_code(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(lesson_id): Path<String>,
    ValidatedJson(dto): ValidatedJson<SubmitCodeDto>,
) -> Result<Json<CheckInResponse>, AppError> {
    let lesson_id = lesson_id_param(lesson_id)?;
    let cancel = state.request_token();

    let response = state
        .check_in
        .submit_code(&lesson_id, dto.kind, &dto.code, &actor.subject_id, &cancel)
        .await?;

    match response.outcome {
        ValidationOutcome::Accepted => Ok(Json(response)),
        ValidationOutcome::Expired => Err(AppError::expired(anyhow::anyhow!(
            "Code has expired"
        ))),
        ValidationOutcome::WrongValue => Err(AppError::input_invalid(anyhow::anyhow!(
            "Code does not match"
        ))),
        ValidationOutcome::AlreadyConsumed => Err(AppError::conflict(anyhow::anyhow!(
            "Code already used"
        ))),
    }
}
