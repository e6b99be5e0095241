use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use rollcall_core::AppError;
use rollcall_models::Actor;

use crate::state::AppState;

/// Extractor that validates the bearer token and yields the acting subject.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::unauthorized("Invalid authorization header format"))?;

        let actor = state.auth.authenticate(token)?;
        Ok(AuthUser(actor))
    }
}
