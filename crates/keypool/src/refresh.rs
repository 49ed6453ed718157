//! Periodic background refresh
//!
//! Spawns a task that probes the active credential on a fixed interval. While
//! the pool is `AllExhausted` each cycle probes every credential instead, so a
//! credential whose quota was reset is found without operator action.
//!
//! Stopping is cooperative: the stop signal is only observed between cycles,
//! so a probe in flight always completes. Each probe's own timeout is the only
//! cancellation boundary.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::PoolCoordinator;
use crate::error::Error;
use crate::failover::HealthState;

/// Default interval between routine refresh cycles.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Handle to a running refresh task.
pub struct RefreshHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the task to stop and wait for the current cycle to finish.
    pub async fn stop(self) {
        // Send fails only if the task already exited
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "refresh task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the refresh task. The first cycle runs one `interval` after start.
pub fn spawn_refresh_task(coordinator: Arc<PoolCoordinator>, interval: Duration) -> RefreshHandle {
    let (stop, mut stopped) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            tokio::select! {
                // A pending stop wins over a tick that is ready at the same time
                biased;
                changed = stopped.changed() => {
                    if changed.is_err() || *stopped.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            // Outside the select: never cancelled by a stop signal
            refresh_cycle(&coordinator).await;
        }
        info!("refresh task stopped");
    });

    RefreshHandle { stop, task }
}

/// Run one cycle.
async fn refresh_cycle(coordinator: &PoolCoordinator) {
    if coordinator.state().await == HealthState::AllExhausted {
        let report = coordinator.refresh_all().await;
        debug!(
            credentials = report.credentials.len(),
            state = report.state.label(),
            "full refresh cycle complete"
        );
        return;
    }

    match coordinator.refresh_active().await {
        Ok(report) => debug!(credential_id = %report.credential_id, "refresh cycle complete"),
        Err(Error::PoolEmpty) => debug!("pool empty, nothing to refresh"),
        Err(e) => warn!(error = %e, "refresh cycle failed"),
    }
}
