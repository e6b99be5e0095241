//! Token signing configuration.
//!
//! # Environment Variables
//!
//! - `JWT_SECRET`: HMAC signing secret, at least 32 bytes (required, no default)
//! - `JWT_ACCESS_EXPIRY`: token lifetime in seconds (default: 3600)
//! - `JWT_ISSUER`: `iss` claim written into and required from every token (default: `rollcall`)

use std::env;

use crate::{ConfigError, env_or};

pub const MIN_SECRET_BYTES: usize = 32;
pub const DEFAULT_ACCESS_EXPIRY: i64 = 3600;
pub const DEFAULT_ISSUER: &str = "rollcall";

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry: i64,
    pub issuer: String,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;

        Self::new(
            secret,
            env_or("JWT_ACCESS_EXPIRY", DEFAULT_ACCESS_EXPIRY),
            env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string()),
        )
    }

    pub fn new(
        secret: impl Into<String>,
        access_token_expiry: i64,
        issuer: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: format!("must be at least {} bytes", MIN_SECRET_BYTES),
            });
        }
        if access_token_expiry <= 0 {
            return Err(ConfigError::Invalid {
                name: "JWT_ACCESS_EXPIRY",
                reason: "must be a positive number of seconds".to_string(),
            });
        }

        Ok(Self {
            secret,
            access_token_expiry,
            issuer: issuer.into(),
        })
    }
}

// The secret never reaches logs through `{:?}`.
impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    #[serial]
    fn test_missing_secret_is_an_error() {
        unsafe { env::remove_var("JWT_SECRET") };
        assert_eq!(
            JwtConfig::from_env().unwrap_err(),
            ConfigError::Missing("JWT_SECRET")
        );
    }

    #[test]
    #[serial]
    fn test_from_env_reads_values() {
        unsafe {
            env::set_var("JWT_SECRET", SECRET);
            env::set_var("JWT_ACCESS_EXPIRY", "120");
            env::remove_var("JWT_ISSUER");
        }

        let config = JwtConfig::from_env().unwrap();
        assert_eq!(config.access_token_expiry, 120);
        assert_eq!(config.issuer, DEFAULT_ISSUER);

        unsafe {
            env::remove_var("JWT_SECRET");
            env::remove_var("JWT_ACCESS_EXPIRY");
        }
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtConfig::new("short", 3600, DEFAULT_ISSUER).is_err());
    }

    #[test]
    fn test_non_positive_expiry_rejected() {
        assert!(JwtConfig::new(SECRET, 0, DEFAULT_ISSUER).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = JwtConfig::new(SECRET, 3600, DEFAULT_ISSUER).unwrap();
        assert!(!format!("{:?}", config).contains(SECRET));
    }
}
