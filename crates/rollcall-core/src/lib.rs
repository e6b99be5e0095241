//! # Rollcall Core
//!
//! Core types, errors, and utilities for the Rollcall API.
//!
//! This crate provides foundational types used throughout the application:
//!
//! - [`errors`]: Application error type and the [`ErrorKind`] taxonomy
//! - [`password`]: Salted secret hashing and fail-closed verification
//! - [`clock`]: Monotonic time source used for every expiry decision
//!
//! # Example
//!
//! ```ignore
//! use rollcall_core::errors::AppError;
//! use rollcall_core::password::{hash_password, verify_password};
//!
//! let hash = hash_password("secure_password")?;
//! assert!(verify_password("secure_password", &hash));
//!
//! let error = AppError::not_found(anyhow::anyhow!("Lesson not found"));
//! ```

pub mod clock;
pub mod errors;
pub mod password;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use errors::{AppError, ErrorKind};
pub use password::{HashScheme, hash_password, needs_rotation, verify_password};

pub use axum::http::StatusCode;
