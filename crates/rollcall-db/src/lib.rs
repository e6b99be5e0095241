//! # Rollcall DB
//!
//! PostgreSQL connection pool for the Rollcall API.
//!
//! The schema (`users`, `lessons`, `attendance`) is owned by
//! the surrounding platform; this crate only opens the pool.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL`: connection string (required)
//! - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
//! - `DATABASE_ACQUIRE_TIMEOUT_SECONDS`: wait for a free connection (default: 5)
//!
//! # Example
//!
//! ```ignore
//! use rollcall_db::init_db_pool;
//!
//! let pool = init_db_pool().await?;
//! ```

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::time::Duration;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECONDS: u64 = 5;

/// Opens a PostgreSQL connection pool from `DATABASE_URL`.
///
/// Should be called once during start-up; the pool is cheaply cloneable.
pub async fn init_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);
    let acquire_timeout = env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECONDS);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout))
        .connect(&database_url)
        .await
        .context("Failed to connect to database")
}

// Re-export PgPool for convenience
pub use sqlx::PgPool;
