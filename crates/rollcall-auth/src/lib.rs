//! # Rollcall Auth
//!
//! Bearer token issuing and validation for the Rollcall API.
//!
//! - [`claims`]: the claim set carried by every access token
//! - [`jwt`]: [`TokenIssuer`], which signs tokens with the process-wide key
//!   and validates them into a typed result
//!
//! Tokens are stateless HS256 JWTs (`header.claims.signature`, base64url
//! segments). There is no revocation list: a token stays valid until its
//! `exp`, so the lifetime is kept short.
//!
//! # Example
//!
//! ```ignore
//! use rollcall_auth::TokenIssuer;
//! use rollcall_config::JwtConfig;
//! use rollcall_core::SystemClock;
//!
//! let issuer = TokenIssuer::new(&JwtConfig::from_env()?, SystemClock::shared());
//! let issued = issuer.issue(&subject_id, Role::Student)?;
//! let verified = issuer.validate(&issued.token)?;
//! ```

pub mod claims;
pub mod jwt;

pub use claims::Claims;
pub use jwt::{IssuedToken, TokenError, TokenIssuer, VerifiedToken};
