//! Periodic pool maintenance ticker.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::GuardError;
use crate::pool::SessionPool;

/// Maintenance cadence used when none is configured.
pub const DEFAULT_MAINTENANCE_PERIOD: Duration = Duration::from_secs(60);

/// Background task calling [`SessionPool::maintain`] on a fixed period.
///
/// The task stops on its own once the pool is shut down, and is aborted when
/// this handle is stopped or dropped.
pub struct MaintenanceTask {
    handle: JoinHandle<()>,
}

impl MaintenanceTask {
    /// Spawns the ticker on the current Tokio runtime. The first pass runs
    /// one `period` after spawning.
    pub fn spawn(pool: Arc<SessionPool>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match pool.maintain() {
                    Ok(report) => {
                        if report.evicted > 0 {
                            tracing::info!(evicted = report.evicted, "expired sessions evicted");
                        }
                    }
                    Err(GuardError::PoolClosed) => {
                        tracing::debug!("session pool closed, stopping maintenance");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "session pool maintenance failed");
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stops the ticker. Idempotent.
    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for MaintenanceTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
