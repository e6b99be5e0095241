//! Access token issuing and validation.
//!
//! Validation runs in a fixed order so each failure is reported once and
//! distinctly:
//!
//! 1. the HMAC over `header.claims` must match the presented signature,
//!    compared in constant time, before any segment is parsed
//! 2. `exp` is compared against the injected server clock
//! 3. the claim set must parse, carry the configured issuer and a valid subject
//!
//! Expiry is checked by hand rather than through [`Validation`] so the
//! server clock, not the system time, decides.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, crypto, decode, decode_header, encode,
};
use std::collections::HashSet;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

use rollcall_config::JwtConfig;
use rollcall_core::{AppError, SharedClock, StatusCode};
use rollcall_models::{Role, SubjectId};

use crate::claims::Claims;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
}

impl TokenError {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenError::BadSignature => "bad_signature",
            TokenError::Expired => "expired",
            TokenError::Malformed => "malformed",
        }
    }

    /// Every variant answers 401; `Expired` keeps its own kind.
    pub fn into_app_error(self) -> AppError {
        match self {
            TokenError::Expired => AppError::expired(self).with_status(StatusCode::UNAUTHORIZED),
            TokenError::BadSignature | TokenError::Malformed => {
                AppError::unauthorized("Invalid token")
            }
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// What a valid token vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject_id: SubjectId,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    issuer: String,
    clock: SharedClock,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig, clock: SharedClock) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            ttl: Duration::seconds(config.access_token_expiry),
            issuer: config.issuer.clone(),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject_id: &SubjectId, role: Role) -> Result<IssuedToken, AppError> {
        let issued_at = self.clock.now();
        let iat = issued_at.timestamp();
        let exp = iat + self.ttl.num_seconds();

        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            iat,
            exp,
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key).map_err(|e| {
            AppError::internal(anyhow::anyhow!("Failed to create token: {}", e))
        })?;

        let expires_at = DateTime::from_timestamp(exp, 0).ok_or_else(|| {
            AppError::internal(anyhow::anyhow!("Token expiry out of range: {}", exp))
        })?;

        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    pub fn validate(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let result = self.check(token);
        if let Err(err) = &result {
            metrics::counter!("rollcall_token_rejections_total", "reason" => err.as_str())
                .increment(1);
            tracing::debug!(reason = err.as_str(), "Token rejected");
        }
        result
    }

    fn check(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let (message, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        self.verify_signature(message, signature)?;

        if message.split('.').count() != 2 {
            return Err(TokenError::Malformed);
        }
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed);
        }

        let raw = decode::<serde_json::Value>(token, &self.decoding_key, &self.lenient_validation())
            .map_err(|_| TokenError::Malformed)?
            .claims;

        let exp = raw
            .get("exp")
            .and_then(serde_json::Value::as_i64)
            .ok_or(TokenError::Malformed)?;
        if self.clock.now().timestamp() >= exp {
            return Err(TokenError::Expired);
        }

        let claims: Claims = serde_json::from_value(raw).map_err(|_| TokenError::Malformed)?;
        if claims.iss != self.issuer || claims.iat > claims.exp {
            return Err(TokenError::Malformed);
        }
        let subject_id = SubjectId::parse(claims.sub).map_err(|_| TokenError::Malformed)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::Malformed)?;

        Ok(VerifiedToken {
            subject_id,
            role: claims.role,
            expires_at,
        })
    }

    fn verify_signature(&self, message: &str, signature: &str) -> Result<(), TokenError> {
        let expected = crypto::sign(message.as_bytes(), &self.encoding_key, ALGORITHM)
            .map_err(|_| TokenError::BadSignature)?;

        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(())
        } else {
            Err(TokenError::BadSignature)
        }
    }

    /// Signature and expiry are already settled when this runs.
    fn lenient_validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_core::ManualClock;
    use std::sync::Arc;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn get_test_jwt_config() -> JwtConfig {
        JwtConfig::new(SECRET, 3600, "rollcall").unwrap()
    }

    fn issuer_at(clock: Arc<ManualClock>) -> TokenIssuer {
        TokenIssuer::new(&get_test_jwt_config(), clock)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
    }

    fn subject() -> SubjectId {
        SubjectId::parse("870101300123").unwrap()
    }

    #[test]
    fn test_issue_then_validate_round_trip() {
        let clock = ManualClock::new(start());
        let issuer = issuer_at(clock);

        for role in [Role::Student, Role::Teacher, Role::Admin] {
            let issued = issuer.issue(&subject(), role).unwrap();
            let verified = issuer.validate(&issued.token).unwrap();
            assert_eq!(verified.subject_id, subject());
            assert_eq!(verified.role, role);
            assert_eq!(verified.expires_at, issued.expires_at);
        }
    }

    #[test]
    fn test_token_has_three_segments() {
        let issuer = issuer_at(ManualClock::new(start()));
        let issued = issuer.issue(&subject(), Role::Student).unwrap();
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.expires_at - issued.issued_at, Duration::hours(1));
    }

    #[test]
    fn test_expired_after_ttl() {
        let clock = ManualClock::new(start());
        let issuer = issuer_at(clock.clone());
        let issued = issuer.issue(&subject(), Role::Student).unwrap();

        clock.advance(Duration::minutes(59));
        assert!(issuer.validate(&issued.token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(issuer.validate(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_any_altered_byte_is_bad_signature() {
        let issuer = issuer_at(ManualClock::new(start()));
        let token = issuer.issue(&subject(), Role::Teacher).unwrap().token;

        for index in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let altered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                issuer.validate(&altered),
                Err(TokenError::BadSignature),
                "alteration at byte {index} was not caught"
            );
        }
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let clock = ManualClock::new(start());
        let issuer = issuer_at(clock.clone());
        let token = issuer.issue(&subject(), Role::Student).unwrap().token;

        let other_config =
            JwtConfig::new("different-secret-key-at-least-32-characters", 3600, "rollcall")
                .unwrap();
        let other = TokenIssuer::new(&other_config, clock);
        assert_eq!(other.validate(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed_or_bad_signature() {
        let issuer = issuer_at(ManualClock::new(start()));
        assert_eq!(issuer.validate("invalid-token"), Err(TokenError::Malformed));
        assert_eq!(issuer.validate(""), Err(TokenError::Malformed));
        assert_eq!(issuer.validate("a.b.c"), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_signed_but_incomplete_claims_are_malformed() {
        #[derive(serde::Serialize)]
        struct Partial {
            sub: String,
            exp: i64,
        }

        let issuer = issuer_at(ManualClock::new(start()));
        let token = encode(
            &Header::new(ALGORITHM),
            &Partial {
                sub: "u1".to_string(),
                exp: start().timestamp() + 60,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(issuer.validate(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn test_foreign_issuer_is_malformed() {
        let clock = ManualClock::new(start());
        let config = JwtConfig::new(SECRET, 3600, "someone-else").unwrap();
        let foreign = TokenIssuer::new(&config, clock.clone());
        let token = foreign.issue(&subject(), Role::Admin).unwrap().token;

        assert_eq!(
            issuer_at(clock).validate(&token),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_expired_token_maps_to_unauthorized_status() {
        let err = TokenError::Expired.into_app_error();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert!(err.is(rollcall_core::ErrorKind::Expired));

        let err = TokenError::BadSignature.into_app_error();
        assert!(err.is(rollcall_core::ErrorKind::Unauthorized));
    }
}
