//! Long-running tasks spawned next to the HTTP server.
//!
//! Each task takes a [`tokio_util::sync::CancellationToken`] and returns once
//! it is cancelled.

pub mod sweeper;
