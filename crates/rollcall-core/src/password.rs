//! Secret hashing and verification.
//!
//! New credentials are always hashed with bcrypt. Verification reads the
//! scheme tag embedded in the stored hash and never propagates an error:
//! empty inputs, unknown tags and malformed hashes all verify as `false`.
//!
//! Unsalted SHA-256 hex digests written by older deployments are still
//! recognised so their owners can log in once, but [`needs_rotation`] reports
//! them and callers must replace them with a bcrypt hash immediately.

use std::sync::OnceLock;

use bcrypt::{DEFAULT_COST, hash, verify};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// bcrypt only reads the first 72 bytes of its input.
pub const MAX_SECRET_BYTES: usize = 72;

/// Hash scheme identified from a stored hash string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    /// `$2a$` / `$2b$` / `$2x$` / `$2y$` prefixed bcrypt hashes.
    Bcrypt,
    /// 64 hex characters, plain SHA-256 of the secret.
    LegacySha256,
    Unknown,
}

impl HashScheme {
    pub fn detect(stored: &str) -> Self {
        const BCRYPT_TAGS: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

        if BCRYPT_TAGS.iter().any(|tag| stored.starts_with(tag)) {
            HashScheme::Bcrypt
        } else if stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit()) {
            HashScheme::LegacySha256
        } else {
            HashScheme::Unknown
        }
    }
}

pub fn hash_password(secret: &str) -> Result<String, AppError> {
    hash_password_with_cost(secret, DEFAULT_COST)
}

/// Lower costs are only meant for tests and seeding.
pub fn hash_password_with_cost(secret: &str, cost: u32) -> Result<String, AppError> {
    if secret.is_empty() {
        return Err(AppError::input_invalid(anyhow::anyhow!(
            "Password must not be empty"
        )));
    }
    if secret.len() > MAX_SECRET_BYTES {
        return Err(AppError::input_invalid(anyhow::anyhow!(
            "Password must be at most {} bytes",
            MAX_SECRET_BYTES
        )));
    }

    hash(secret, cost)
        .map_err(|e| AppError::internal(anyhow::anyhow!("Failed to hash password: {}", e)))
}

pub fn verify_password(secret: &str, stored: &str) -> bool {
    if secret.is_empty() || stored.is_empty() {
        return false;
    }

    match HashScheme::detect(stored) {
        HashScheme::Bcrypt => {
            // Longer inputs would match on their truncated prefix.
            if secret.len() > MAX_SECRET_BYTES {
                return false;
            }
            match verify(secret, stored) {
                Ok(valid) => valid,
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed bcrypt hash rejected");
                    false
                }
            }
        }
        HashScheme::LegacySha256 => {
            let digest = hex::encode(Sha256::digest(secret.as_bytes()));
            digest
                .as_bytes()
                .ct_eq(stored.to_ascii_lowercase().as_bytes())
                .into()
        }
        HashScheme::Unknown => {
            tracing::warn!("Stored hash has an unknown scheme tag");
            false
        }
    }
}

/// True when the stored hash must be replaced by a fresh bcrypt hash.
pub fn needs_rotation(stored: &str) -> bool {
    HashScheme::detect(stored) != HashScheme::Bcrypt
}

/// Spends the same work as a real bcrypt check against a hash nobody owns.
///
/// Used when the subject does not exist so response timing does not reveal it.
pub fn verify_against_dummy(secret: &str) {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();

    let dummy = DUMMY.get_or_init(|| hash("rollcall-dummy-secret", DEFAULT_COST).ok());
    if let Some(dummy) = dummy {
        let _ = verify_password(secret, dummy);
    }
}
