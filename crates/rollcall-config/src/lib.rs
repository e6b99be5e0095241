//! # Rollcall Config
//!
//! Configuration types for the Rollcall API.
//!
//! Every structure here is loaded from environment variables once at start-up
//! and handed to the components that need it:
//!
//! - [`jwt`]: token signing configuration (the secret has no default)
//! - [`attendance`]: code lifetimes, code shapes, grace window, sweep cadence
//! - [`server`]: listener address
//!
//! # Example
//!
//! ```ignore
//! use rollcall_config::{AttendanceConfig, JwtConfig, ServerConfig};
//!
//! let jwt_config = JwtConfig::from_env()?;
//! let attendance_config = AttendanceConfig::from_env();
//! let server_config = ServerConfig::from_env();
//! ```

pub mod attendance;
pub mod error;
pub mod jwt;
pub mod server;

// Re-export commonly used types at crate root
pub use attendance::AttendanceConfig;
pub use error::ConfigError;
pub use jwt::JwtConfig;
pub use server::ServerConfig;

/// Reads and parses an optional variable, falling back to `default` when unset or unparsable.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
