//! Attendance code and check-in configuration.
//!
//! # Environment Variables
//!
//! - `ATTENDANCE_GRACE_MINUTES`: minutes after lesson start a check-in still counts as present (default: 5)
//! - `CODE_DEFAULT_TTL_SECONDS`: lifetime of a code when the teacher gives none (default: 600)
//! - `CODE_MAX_TTL_SECONDS`: longest lifetime a teacher may request (default: 14400)
//! - `PINCODE_DIGITS`: pincode length, clamped to 4..=9 (default: 6)
//! - `QR_TOKEN_LENGTH`: QR token length, at least 16 (default: 32)
//! - `UPSTREAM_TIMEOUT_MS`: per-call timeout for lookups and writes (default: 5000)
//! - `SWEEP_INTERVAL_SECONDS`: how often ended lessons are swept (default: 60)

use std::time::Duration;

use crate::env_or;

pub const MIN_PINCODE_DIGITS: u32 = 4;
pub const MAX_PINCODE_DIGITS: u32 = 9;
pub const MIN_QR_TOKEN_LENGTH: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttendanceConfig {
    pub grace_window: Duration,
    pub default_code_ttl: Duration,
    pub max_code_ttl: Duration,
    pub pincode_digits: u32,
    pub qr_token_length: usize,
    pub upstream_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::from_secs(5 * 60),
            default_code_ttl: Duration::from_secs(600),
            max_code_ttl: Duration::from_secs(4 * 3600),
            pincode_digits: 6,
            qr_token_length: 32,
            upstream_timeout: Duration::from_millis(5000),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl AttendanceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            grace_window: Duration::from_secs(
                env_or("ATTENDANCE_GRACE_MINUTES", defaults.grace_window.as_secs() / 60) * 60,
            ),
            default_code_ttl: Duration::from_secs(env_or(
                "CODE_DEFAULT_TTL_SECONDS",
                defaults.default_code_ttl.as_secs(),
            )),
            max_code_ttl: Duration::from_secs(env_or(
                "CODE_MAX_TTL_SECONDS",
                defaults.max_code_ttl.as_secs(),
            )),
            pincode_digits: env_or("PINCODE_DIGITS", defaults.pincode_digits),
            qr_token_length: env_or("QR_TOKEN_LENGTH", defaults.qr_token_length),
            upstream_timeout: Duration::from_millis(env_or(
                "UPSTREAM_TIMEOUT_MS",
                defaults.upstream_timeout.as_millis() as u64,
            )),
            sweep_interval: Duration::from_secs(env_or(
                "SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval.as_secs(),
            )),
        }
        .normalized()
    }

    /// Pulls out-of-range values back to something safe.
    pub fn normalized(mut self) -> Self {
        self.pincode_digits = self
            .pincode_digits
            .clamp(MIN_PINCODE_DIGITS, MAX_PINCODE_DIGITS);
        self.qr_token_length = self.qr_token_length.max(MIN_QR_TOKEN_LENGTH);
        if self.max_code_ttl.is_zero() {
            self.max_code_ttl = Self::default().max_code_ttl;
        }
        if self.default_code_ttl.is_zero() || self.default_code_ttl > self.max_code_ttl {
            self.default_code_ttl = self.max_code_ttl.min(Self::default().default_code_ttl);
        }
        if self.sweep_interval.is_zero() {
            self.sweep_interval = Self::default().sweep_interval;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        unsafe {
            std::env::remove_var("ATTENDANCE_GRACE_MINUTES");
            std::env::remove_var("PINCODE_DIGITS");
        }
        let config = AttendanceConfig::from_env();
        assert_eq!(config.grace_window, Duration::from_secs(300));
        assert_eq!(config.pincode_digits, 6);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("ATTENDANCE_GRACE_MINUTES", "10");
            std::env::set_var("PINCODE_DIGITS", "4");
        }
        let config = AttendanceConfig::from_env();
        assert_eq!(config.grace_window, Duration::from_secs(600));
        assert_eq!(config.pincode_digits, 4);
        unsafe {
            std::env::remove_var("ATTENDANCE_GRACE_MINUTES");
            std::env::remove_var("PINCODE_DIGITS");
        }
    }

    #[test]
    fn test_normalized_clamps_code_shapes() {
        let config = AttendanceConfig {
            pincode_digits: 2,
            qr_token_length: 4,
            ..AttendanceConfig::default()
        }
        .normalized();

        assert_eq!(config.pincode_digits, MIN_PINCODE_DIGITS);
        assert_eq!(config.qr_token_length, MIN_QR_TOKEN_LENGTH);
    }

    #[test]
    fn test_default_ttl_never_exceeds_max() {
        let config = AttendanceConfig {
            default_code_ttl: Duration::from_secs(7200),
            max_code_ttl: Duration::from_secs(60),
            ..AttendanceConfig::default()
        }
        .normalized();

        assert!(config.default_code_ttl <= config.max_code_ttl);
    }
}
