//! Device presence registry using the Actor pattern.
//!
//! The registry is the single source of truth for which beacons are present.
//! It receives commands via a tokio mpsc channel, so every mutation (admission,
//! frame application, removal, sweep) runs to completion before the next one
//! starts.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  DeviceServer   │────▶│  RegistryActor  │────▶│ Broadcast Channel│
//! │ HeartbeatMonitor│     │                 │     └──────────────────┘
//! └─────────────────┘     │  trigger ───────┼────▶ NotificationDispatcher
//!         │               └─────────────────┘
//!         │   RegistryCommand     │
//!         │   (mpsc channel)      │
//!         ▼                       ▼
//!    Admit/ApplyFrame/      HashMap<DeviceAddress,
//!    Remove/Sweep           Device>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use doorwatch_core::LockSensor;
use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod device;
mod handle;

pub use actor::RegistryActor;
pub use commands::{
    Admission, DeviceEvent, RegistryCommand, RegistryError, RegistryStatus, RemovalReason,
};
pub use device::LinkHandle;
pub use handle::RegistryHandle;

use crate::notify::NotificationDispatcher;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor reads `lock_sensor` when the last device leaves and hands
/// reminder tokens to `dispatcher`. It stops on
/// [`RegistryHandle::shutdown`] or when every handle is dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use doorwatch_core::LockState;
/// use doorwatchd::notify::{spawn_notification_worker, LogNotifier};
/// use doorwatchd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let (dispatcher, _worker) = spawn_notification_worker(Arc::new(LogNotifier));
///     let handle = spawn_registry(10, Arc::new(LockState::Unknown), dispatcher);
///
///     let devices = handle.get_all_devices().await;
/// }
/// ```
pub fn spawn_registry(
    max_devices: usize,
    lock_sensor: Arc<dyn LockSensor>,
    dispatcher: NotificationDispatcher,
) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = RegistryActor::new(cmd_rx, event_tx.clone(), max_devices, lock_sensor, dispatcher);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx, event_tx)
}
