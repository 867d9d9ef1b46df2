//! Heartbeat monitor for the doorwatch daemon.
//!
//! Beacons prove they are alive by sending frames. A beacon that walks out of
//! radio range often leaves its link half-open, so a periodic sweep evicts
//! every device that has been silent for longer than the heartbeat timeout.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A vanished registry ends the task instead of erroring

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::registry::RegistryHandle;

/// Sweep cadence and staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Spawns the heartbeat monitor.
///
/// The first sweep runs one interval after start. The task stops when
/// `cancel_token` fires or the registry goes away, and reports the total
/// number of evicted devices.
pub fn spawn_heartbeat_monitor(
    registry: RegistryHandle,
    settings: HeartbeatSettings,
    cancel_token: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let Some(first) = Instant::now().checked_add(settings.interval) else {
            error!(
                interval_secs = settings.interval.as_secs(),
                "Heartbeat interval out of range, monitor not started"
            );
            return 0;
        };
        let mut tick = interval_at(first, settings.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = settings.interval.as_secs(),
            timeout_secs = settings.timeout.as_secs(),
            "Heartbeat monitor started"
        );

        let mut evicted = 0;
        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Heartbeat monitor shutting down");
                    break;
                }

                _ = tick.tick() => {
                    match registry.sweep(settings.timeout).await {
                        Ok(0) => debug!("Heartbeat sweep: all devices alive"),
                        Ok(removed) => {
                            evicted += removed;
                            info!(removed, "Heartbeat sweep evicted silent devices");
                        }
                        Err(e) => {
                            debug!(error = %e, "Registry gone, heartbeat monitor stopping");
                            break;
                        }
                    }
                }
            }
        }

        debug!(evicted, "Heartbeat monitor task completed");
        evicted
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = HeartbeatSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(10));
        assert_eq!(settings.timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let (event_tx, _) = tokio::sync::broadcast::channel(1);
        let registry = RegistryHandle::new(tx, event_tx);
        let cancel = CancellationToken::new();

        let task = spawn_heartbeat_monitor(registry, HeartbeatSettings::default(), cancel.clone());
        cancel.cancel();
        assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_interval_does_not_panic() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let (event_tx, _) = tokio::sync::broadcast::channel(1);
        let registry = RegistryHandle::new(tx, event_tx);
        let settings = HeartbeatSettings {
            interval: Duration::from_secs(u64::MAX),
            timeout: Duration::from_secs(60),
        };

        let task = spawn_heartbeat_monitor(registry, settings, CancellationToken::new());
        assert_eq!(task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_registry_gone() {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let (event_tx, _) = tokio::sync::broadcast::channel(1);
        drop(rx);
        let registry = RegistryHandle::new(tx, event_tx);

        let task = spawn_heartbeat_monitor(
            registry,
            HeartbeatSettings::default(),
            CancellationToken::new(),
        );
        assert_eq!(task.await.unwrap(), 0);
    }
}
