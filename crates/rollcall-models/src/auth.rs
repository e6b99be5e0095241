//! Authentication DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ids::SubjectId;
use crate::users::Role;

/// Login with UIN and password.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub uin: String,
    #[validate(length(min = 1, max = 72))]
    pub password: String,
}

/// Successful login: a bearer token and when it stops being accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub subject_id: SubjectId,
    pub role: Role,
}

/// Admin-only registration of a new credential.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64))]
    pub uin: String,
    #[validate(length(min = 8, max = 72))]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub subject_id: SubjectId,
    pub role: Role,
}
