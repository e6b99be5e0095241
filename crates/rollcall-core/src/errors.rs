use anyhow::Error;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Failure categories surfaced to the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input, rejected before any state is touched.
    InputInvalid,
    /// Credential or token check failed.
    Unauthorized,
    /// Authenticated, but the role does not allow the action.
    Forbidden,
    /// Competing state, e.g. a code is already active.
    Conflict,
    /// A code or token is past its validity window.
    Expired,
    /// Unknown lesson or subject.
    NotFound,
    /// A collaborator lookup or write failed.
    Upstream,
    /// Invariant violation or unexpected failure.
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InputInvalid => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Upstream => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Expired => "expired",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub error: Error,
}

impl AppError {
    pub fn new<E>(kind: ErrorKind, err: E) -> Self
    where
        E: Into<Error>,
    {
        Self {
            kind,
            status: kind.status_code(),
            error: err.into(),
        }
    }

    /// Same kind, but answered with a different status (e.g. 422 for body validation).
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn input_invalid<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::InputInvalid, err)
    }

    pub fn unprocessable<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::InputInvalid, err).with_status(StatusCode::UNPROCESSABLE_ENTITY)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, anyhow::anyhow!(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, anyhow::anyhow!(message.into()))
    }

    pub fn conflict<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::Conflict, err)
    }

    pub fn expired<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::Expired, err)
    }

    pub fn not_found<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::NotFound, err)
    }

    pub fn upstream<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::Upstream, err)
    }

    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Error>,
    {
        Self::new(ErrorKind::Internal, err)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match self.kind {
            // Collaborator and invariant details stay in the logs.
            ErrorKind::Upstream | ErrorKind::Internal => {
                tracing::error!(kind = %self.kind, error = ?self.error, "Request failed");
                match self.kind {
                    ErrorKind::Upstream => "Upstream service unavailable".to_string(),
                    _ => "Internal server error".to_string(),
                }
            }
            _ => self.error.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind,
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        AppError::internal(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_maps_to_status() {
        assert_eq!(
            AppError::expired(anyhow::anyhow!("gone")).status,
            StatusCode::GONE
        );
        assert_eq!(
            AppError::conflict(anyhow::anyhow!("busy")).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::upstream(anyhow::anyhow!("db down")).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_unprocessable_keeps_input_invalid_kind() {
        let err = AppError::unprocessable(anyhow::anyhow!("uin is required"));
        assert_eq!(err.kind, ErrorKind::InputInvalid);
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_foreign_errors_become_internal() {
        let err: AppError = std::io::Error::other("boom").into();
        assert!(err.is(ErrorKind::Internal));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let value = serde_json::to_value(ErrorKind::InputInvalid).unwrap();
        assert_eq!(value, "input_invalid");
    }
}
