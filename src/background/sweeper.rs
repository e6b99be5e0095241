//! Periodic absence sweep.
//!
//! Marks every still-pending roster member of an ended lesson absent and
//! releases the lesson's in-memory code and attendance state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::modules::CheckInService;

pub async fn run(service: Arc<CheckInService>, every: Duration, cancel: CancellationToken) {
    info!(interval_secs = every.as_secs(), "Attendance sweeper started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Attendance sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                let swept = service.sweep_ended_lessons(&cancel).await;
                if swept == 0 {
                    debug!("Attendance sweep: nothing to mark");
                }
            }
        }
    }
}
