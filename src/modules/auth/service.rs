use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use rollcall_auth::TokenIssuer;
use rollcall_core::AppError;
use rollcall_core::password::{hash_password, needs_rotation, verify_against_dummy, verify_password};
use rollcall_models::{
    Actor, Credential, LoginResponse, RegisterRequest, RegisteredUser, Role, SubjectId,
};

use crate::collaborators::{CredentialLookupPtr, UpstreamPolicy};
use crate::metrics::{track_credential_registered, track_login};

const INVALID_CREDENTIALS: &str = "Invalid UIN or password";

/// Login, registration and bearer token checks.
#[derive(Clone)]
pub struct AuthenticationService {
    credentials: CredentialLookupPtr,
    tokens: Arc<TokenIssuer>,
    upstream: UpstreamPolicy,
}

impl std::fmt::Debug for AuthenticationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationService")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AuthenticationService {
    pub fn new(
        credentials: CredentialLookupPtr,
        tokens: Arc<TokenIssuer>,
        upstream: UpstreamPolicy,
    ) -> Self {
        Self {
            credentials,
            tokens,
            upstream,
        }
    }

    /// Verifies a UIN and password and issues a bearer token.
    ///
    /// Unknown UINs and wrong passwords produce the same error after the same
    /// amount of hashing work. A legacy digest is replaced by a bcrypt hash
    /// before the token is issued; if that write fails the login fails.
    #[instrument(skip(self, secret, cancel))]
    pub async fn login(
        &self,
        uin: &str,
        secret: &str,
        cancel: &CancellationToken,
    ) -> Result<LoginResponse, AppError> {
        if uin.trim().is_empty() || secret.is_empty() {
            return Err(AppError::input_invalid(anyhow::anyhow!(
                "UIN and password are required"
            )));
        }
        let subject_id = SubjectId::parse(uin.trim()).map_err(AppError::input_invalid)?;

        let credential = self
            .upstream
            .read("find_by_subject", cancel, || {
                self.credentials.find_by_subject(&subject_id)
            })
            .await?;

        let Some(credential) = credential else {
            let secret = secret.to_owned();
            tokio::task::spawn_blocking(move || verify_against_dummy(&secret)).await?;
            track_login("invalid_credentials");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        };

        let valid = {
            let secret = secret.to_owned();
            let stored = credential.secret_hash.clone();
            tokio::task::spawn_blocking(move || verify_password(&secret, &stored)).await?
        };
        if !valid {
            track_login("invalid_credentials");
            return Err(AppError::unauthorized(INVALID_CREDENTIALS));
        }

        if needs_rotation(&credential.secret_hash) {
            self.rotate_legacy_hash(&credential, secret, cancel).await?;
        }

        let issued = self.tokens.issue(&credential.subject_id, credential.role)?;
        track_login("success");
        info!(subject_id = %credential.subject_id, role = %credential.role, "Login succeeded");

        Ok(LoginResponse {
            access_token: issued.token,
            token_type: "Bearer".to_string(),
            expires_at: issued.expires_at,
            subject_id: credential.subject_id,
            role: credential.role,
        })
    }

    /// Creates a credential. Admins only.
    #[instrument(skip(self, dto, cancel), fields(uin = %dto.uin, role = %dto.role))]
    pub async fn register(
        &self,
        actor: &Actor,
        dto: RegisterRequest,
        cancel: &CancellationToken,
    ) -> Result<RegisteredUser, AppError> {
        if actor.role != Role::Admin {
            return Err(AppError::forbidden("Only administrators can register users"));
        }
        let subject_id = SubjectId::parse(dto.uin.trim()).map_err(AppError::input_invalid)?;

        let password = dto.password;
        let secret_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

        let credential = Credential {
            subject_id: subject_id.clone(),
            secret_hash,
            role: dto.role,
        };
        let inserted = self
            .upstream
            .write("insert_credential", cancel, self.credentials.insert(&credential))
            .await?;
        if !inserted {
            return Err(AppError::conflict(anyhow::anyhow!(
                "UIN {} is already registered",
                subject_id
            )));
        }

        track_credential_registered(dto.role.as_str());
        info!(subject_id = %subject_id, actor_id = %actor.subject_id, "User registered");

        Ok(RegisteredUser {
            subject_id,
            role: dto.role,
        })
    }

    /// Resolves a bearer token into the acting subject.
    pub fn authenticate(&self, token: &str) -> Result<Actor, AppError> {
        let verified = self
            .tokens
            .validate(token)
            .map_err(|e| e.into_app_error())?;
        Ok(Actor::new(verified.subject_id, verified.role))
    }

    async fn rotate_legacy_hash(
        &self,
        credential: &Credential,
        secret: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let secret = secret.to_owned();
        let fresh = tokio::task::spawn_blocking(move || hash_password(&secret)).await??;

        self.upstream
            .write(
                "replace_secret_hash",
                cancel,
                self.credentials
                    .replace_secret_hash(&credential.subject_id, &fresh),
            )
            .await
            .inspect_err(|e| {
                warn!(subject_id = %credential.subject_id, error = %e, "Legacy password hash rotation failed");
            })?;

        info!(subject_id = %credential.subject_id, "Legacy password hash rotated to bcrypt");
        Ok(())
    }
}
