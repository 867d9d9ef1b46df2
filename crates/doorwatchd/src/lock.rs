//! Lock sensor poller.
//!
//! The door sensor is exposed as a sysfs-style GPIO value file holding `1`
//! while the bolt is retracted and `0` while it is thrown. The poller copies
//! that level into a [`SharedLockState`] the registry reads when the last
//! device leaves.

use std::path::PathBuf;
use std::time::Duration;

use doorwatch_core::{LockState, SharedLockState};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reads the lock state from a GPIO value file.
///
/// Unreadable files and unexpected contents read as [`LockState::Unknown`].
pub async fn read_lock_file(path: &std::path::Path) -> LockState {
    match tokio::fs::read_to_string(path).await {
        Ok(level) => LockState::from_gpio_level(&level),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Lock sensor unreadable");
            LockState::Unknown
        }
    }
}

/// Spawns a task that keeps `state` in sync with the file at `path`.
///
/// The first read happens immediately. State changes are logged.
pub fn spawn_lock_poller(
    path: PathBuf,
    poll_interval: Duration,
    state: SharedLockState,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            path = %path.display(),
            interval_ms = poll_interval.as_millis() as u64,
            "Lock sensor poller started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,

                _ = tick.tick() => {
                    let current = read_lock_file(&path).await;
                    let previous = state.set(current);
                    if previous != current {
                        match current {
                            LockState::Unknown => warn!(previous = %previous, "Lock state unknown"),
                            _ => info!(
                                state = %current,
                                previous = %previous,
                                "Lock state changed"
                            ),
                        }
                    }
                }
            }
        }

        debug!("Lock sensor poller stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorwatch_core::LockSensor;

    #[tokio::test]
    async fn test_read_lock_file_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");

        std::fs::write(&path, "1\n").unwrap();
        assert_eq!(read_lock_file(&path).await, LockState::Unlocked);

        std::fs::write(&path, "0\n").unwrap();
        assert_eq!(read_lock_file(&path).await, LockState::Locked);

        assert_eq!(read_lock_file(&dir.path().join("missing")).await, LockState::Unknown);
    }

    #[tokio::test]
    async fn test_poller_tracks_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        std::fs::write(&path, "1").unwrap();

        let state = SharedLockState::default();
        let cancel = CancellationToken::new();
        let task = spawn_lock_poller(
            path.clone(),
            Duration::from_millis(5),
            state.clone(),
            cancel.clone(),
        );

        for _ in 0..200 {
            if state.read_lock_state() == LockState::Unlocked {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state.read_lock_state(), LockState::Unlocked);

        std::fs::write(&path, "0").unwrap();
        for _ in 0..200 {
            if state.read_lock_state() == LockState::Locked {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state.read_lock_state(), LockState::Locked);

        cancel.cancel();
        task.await.unwrap();
    }
}
