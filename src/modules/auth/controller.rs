use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::instrument;

use rollcall_core::AppError;
use rollcall_models::{LoginRequest, LoginResponse, RegisterRequest, RegisteredUser};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;
use crate::validator::ValidatedJson;

/// Exchange a UIN and password for a bearer token.
#[instrument(skip_all)]
pub async fn login_user(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let cancel = state.request_token();
    let response = state.auth.login(&dto.uin, &dto.password, &cancel).await?;
    Ok(Json(response))
}

/// Create a credential. Admins only.
#[instrument(skip_all)]
pub async fn register_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ValidatedJson(dto): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), AppError> {
    let cancel = state.request_token();
    let user = state.auth.register(&actor, dto, &cancel).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
