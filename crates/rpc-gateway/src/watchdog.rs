//! Periodic eviction of stale pending calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pending::PendingCallRegistry;

/// Background task failing pending calls older than a threshold with
/// `Timedout`. Started on connect, stopped cooperatively on disconnect.
pub struct Watchdog {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn the eviction loop.
    ///
    /// Wakes every `cycle` and evicts calls older than `threshold`.
    pub fn start(registry: Arc<PendingCallRegistry>, cycle: Duration, threshold: Duration) -> Self {
        let token = CancellationToken::new();
        let stop = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cycle);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = registry.evict_older_than(threshold);
                        if evicted > 0 {
                            warn!(evicted, "pending calls timed out");
                        }
                    }
                }
            }
            debug!("watchdog stopped");
        });
        Self { token, task }
    }

    /// Request the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.task.await;
    }
}
