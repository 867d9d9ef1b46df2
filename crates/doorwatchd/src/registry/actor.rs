//! Registry actor - owns all device state and processes commands.
//!
//! The RegistryActor is the single owner of device state in the system.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//! Because every command is handled to completion before the next one is
//! received, admission, frame application, eviction, and the notification
//! trigger never observe each other half-done.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use doorwatch_core::{DeliveryToken, DeviceAddress, DeviceView, LinkId, LockSensor};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::commands::{
    Admission, DeviceEvent, RegistryCommand, RegistryError, RegistryStatus, RemovalReason,
};
use super::device::{Device, LinkHandle};
use crate::notify::NotificationDispatcher;
use crate::trigger::{NotificationTrigger, SuppressReason, TriggerOutcome};

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all device state.
///
/// # Ownership
///
/// The actor owns:
/// - `devices`: device records keyed by address (primary key)
/// - `links`: index for link id → address lookups
/// - `last_vacated_token`: token of the most recently removed device that had one
/// - `trigger`: the Armed/Watching reminder state machine
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,

    devices: HashMap<DeviceAddress, Device>,

    /// Only the current link of each device is indexed. A link replaced by a
    /// reconnect drops out of here, so its late close resolves to nothing.
    links: HashMap<LinkId, DeviceAddress>,

    max_devices: usize,

    /// Overwritten on removal of a device holding a token, never cleared.
    last_vacated_token: Option<DeliveryToken>,

    trigger: NotificationTrigger,
    lock_sensor: Arc<dyn LockSensor>,
    dispatcher: NotificationDispatcher,

    event_publisher: broadcast::Sender<DeviceEvent>,
}

impl RegistryActor {
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<DeviceEvent>,
        max_devices: usize,
        lock_sensor: Arc<dyn LockSensor>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            receiver,
            devices: HashMap::new(),
            links: HashMap::new(),
            max_devices,
            last_vacated_token: None,
            trigger: NotificationTrigger::new(),
            lock_sensor,
            dispatcher,
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until a `Shutdown` command arrives or the channel
    /// closes (all senders dropped). Either way every owned link is closed
    /// before returning.
    pub async fn run(mut self) {
        info!(max_devices = self.max_devices, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            if let RegistryCommand::Shutdown { respond_to } = cmd {
                let released = self.release_all();
                let _ = respond_to.send(released);
                info!(released, "Registry shut down");
                return;
            }
            self.handle_command(cmd);
        }

        let released = self.release_all();
        info!(released, "Registry actor stopped (all handles dropped)");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Admit {
                address,
                link,
                respond_to,
            } => {
                let result = self.handle_admit(address, link);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Register {
                address,
                link,
                respond_to,
            } => {
                let result = self.handle_register(address, link);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Reconnect {
                address,
                link,
                respond_to,
            } => {
                let result = self.handle_reconnect(address, link);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Lookup {
                address,
                respond_to,
            } => {
                let now = Instant::now();
                let _ = respond_to.send(self.devices.get(&address).map(|d| d.view(now)));
            }
            RegistryCommand::LookupByLink { link, respond_to } => {
                let now = Instant::now();
                let view = self
                    .links
                    .get(&link)
                    .and_then(|address| self.devices.get(address))
                    .map(|d| d.view(now));
                let _ = respond_to.send(view);
            }
            RegistryCommand::HasCapacity { respond_to } => {
                let _ = respond_to.send(self.has_capacity());
            }
            RegistryCommand::GetAllDevices { respond_to } => {
                let _ = respond_to.send(self.handle_get_all_devices());
            }
            RegistryCommand::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }
            RegistryCommand::ApplyFrame {
                link,
                token,
                respond_to,
            } => {
                let result = self.handle_apply_frame(link, token);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove {
                address,
                reason,
                respond_to,
            } => {
                let result = self.handle_remove(&address, reason);
                let _ = respond_to.send(result);
            }
            RegistryCommand::RemoveByLink {
                link,
                reason,
                respond_to,
            } => {
                let result = match self.links.get(&link).cloned() {
                    Some(address) => self.handle_remove(&address, reason),
                    None => {
                        debug!(
                            link = %link,
                            reason = %reason,
                            "Link no longer owns a device, ignoring"
                        );
                        None
                    }
                };
                let _ = respond_to.send(result);
            }
            RegistryCommand::Sweep {
                timeout,
                respond_to,
            } => {
                let removed = self.handle_sweep(timeout);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Shutdown { respond_to } => {
                // Normally intercepted by `run`; handled here for direct callers.
                let _ = respond_to.send(self.release_all());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_admit(
        &mut self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<Admission, RegistryError> {
        let admission = if self.devices.contains_key(&address) {
            self.handle_reconnect(address, link).map(Admission::Reconnected)
        } else {
            self.handle_register(address, link).map(Admission::Registered)
        }?;
        self.log_status();
        Ok(admission)
    }

    fn handle_register(
        &mut self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<DeviceView, RegistryError> {
        Self::check_link(&link)?;

        if self.devices.contains_key(&address) {
            debug!(address = %address, "Device already registered, rejecting registration");
            return Err(RegistryError::AlreadyRegistered(address));
        }

        if !self.has_capacity() {
            warn!(
                address = %address,
                current = self.devices.len(),
                max = self.max_devices,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_devices,
            });
        }

        let now = Instant::now();
        let link_id = link.id();
        let device = Device::new(address.clone(), link, now);
        let view = device.view(now);

        self.links.insert(link_id, address.clone());
        self.devices.insert(address.clone(), device);

        info!(
            address = %address,
            link = %link_id,
            devices = self.devices.len(),
            "Device registered"
        );

        if self.trigger.on_occupied() {
            debug!("Reminder trigger armed");
        }

        let _ = self.event_publisher.send(DeviceEvent::Registered {
            address,
            link: link_id,
        });

        Ok(view)
    }

    fn handle_reconnect(
        &mut self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<DeviceView, RegistryError> {
        Self::check_link(&link)?;

        let now = Instant::now();
        let link_id = link.id();
        let Some(device) = self.devices.get_mut(&address) else {
            return Err(RegistryError::DeviceNotFound(address));
        };
        if device.link.id() == link_id {
            return Err(RegistryError::InvalidParameter(format!(
                "{link_id} is already the current link of {address}"
            )));
        }

        let old = device.replace_link(link, now);
        let view = device.view(now);

        self.links.remove(&old.id());
        self.links.insert(link_id, address.clone());

        info!(
            address = %address,
            old_link = %old.id(),
            link = %link_id,
            has_token = view.has_token(),
            "Device reconnected"
        );

        let _ = self.event_publisher.send(DeviceEvent::Reconnected {
            address,
            link: link_id,
        });

        Ok(view)
    }

    fn handle_get_all_devices(&self) -> Vec<DeviceView> {
        let now = Instant::now();
        let mut views: Vec<DeviceView> = self.devices.values().map(|d| d.view(now)).collect();
        views.sort_by(|a, b| a.address.cmp(&b.address));
        views
    }

    fn handle_apply_frame(
        &mut self,
        link: LinkId,
        token: Option<DeliveryToken>,
    ) -> Result<DeviceView, RegistryError> {
        let device = self
            .links
            .get(&link)
            .and_then(|address| self.devices.get_mut(address))
            .ok_or(RegistryError::LinkNotFound(link))?;

        let now = Instant::now();
        device.touch(now);
        device.frames_received = device.frames_received.saturating_add(1);

        if let Some(token) = token {
            info!(
                address = %device.address,
                token = %token.preview(),
                "Delivery token updated"
            );
            device.token = Some(token);
            let _ = self.event_publisher.send(DeviceEvent::TokenUpdated {
                address: device.address.clone(),
            });
        }

        Ok(device.view(now))
    }

    /// Removes a device, closing its link.
    ///
    /// Returns `None` if the address is absent (no-op).
    fn handle_remove(
        &mut self,
        address: &DeviceAddress,
        reason: RemovalReason,
    ) -> Option<DeviceView> {
        let Some(device) = self.devices.remove(address) else {
            debug!(address = %address, reason = %reason, "Device already removed");
            return None;
        };

        let view = device.view(Instant::now());
        self.links.remove(&device.link.id());
        device.link.close();

        if let Some(token) = device.token.filter(|t| !t.is_empty()) {
            self.last_vacated_token = Some(token);
        }

        let remaining = self.devices.len();
        info!(
            address = %address,
            link = %view.link,
            reason = %reason,
            devices = remaining,
            "Device removed"
        );

        let _ = self.event_publisher.send(DeviceEvent::Removed {
            address: address.clone(),
            reason,
            remaining,
        });

        if remaining == 0 {
            self.evaluate_trigger();
        }

        Some(view)
    }

    /// Removes every device idle for longer than `timeout`.
    ///
    /// Candidates are collected first so removal never mutates the table
    /// while it is being walked.
    fn handle_sweep(&mut self, timeout: Duration) -> usize {
        let now = Instant::now();
        let stale: Vec<DeviceAddress> = self
            .devices
            .values()
            .filter(|d| d.idle_for(now) > timeout)
            .map(|d| d.address.clone())
            .collect();

        if stale.is_empty() {
            return 0;
        }

        for address in &stale {
            if let Some(device) = self.devices.get(address) {
                warn!(
                    address = %address,
                    idle_secs = device.idle_for(now).as_secs(),
                    "Heartbeat timeout"
                );
            }
        }

        let removed = stale
            .iter()
            .filter_map(|address| self.handle_remove(address, RemovalReason::Timeout))
            .count();

        self.log_status();
        removed
    }

    // ========================================================================
    // Trigger
    // ========================================================================

    fn evaluate_trigger(&mut self) {
        let Some(outcome) = self
            .trigger
            .on_vacated(self.last_vacated_token.as_ref(), self.lock_sensor.as_ref())
        else {
            return;
        };

        match &outcome {
            TriggerOutcome::Notify(token) => {
                info!(
                    token = %token.preview(),
                    "All devices gone and door unlocked, sending door close reminder"
                );
                self.dispatcher.dispatch(token.clone());
            }
            TriggerOutcome::Suppressed(SuppressReason::Locked) => {
                info!("All devices gone, door is locked");
            }
            TriggerOutcome::Suppressed(reason) => {
                warn!(reason = %reason, "All devices gone, reminder suppressed");
            }
        }

        let _ = self.event_publisher.send(DeviceEvent::Vacated { outcome });
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn has_capacity(&self) -> bool {
        self.devices.len() < self.max_devices
    }

    fn check_link(link: &LinkHandle) -> Result<(), RegistryError> {
        if link.is_closed() {
            return Err(RegistryError::InvalidParameter(format!(
                "{} is already closed",
                link.id()
            )));
        }
        Ok(())
    }

    fn status(&self) -> RegistryStatus {
        RegistryStatus {
            device_count: self.devices.len(),
            max_devices: self.max_devices,
            trigger: self.trigger.state(),
            last_vacated_token: self.last_vacated_token.as_ref().map(DeliveryToken::preview),
        }
    }

    fn log_status(&self) {
        info!(
            devices = self.devices.len(),
            max = self.max_devices,
            "Registry status"
        );
        for view in self.handle_get_all_devices() {
            info!("  {}", view.summary());
        }
    }

    /// Closes every link and empties the table without touching the trigger.
    fn release_all(&mut self) -> usize {
        let released = self.devices.len();
        for (address, device) in self.devices.drain() {
            device.link.close();
            let _ = self.event_publisher.send(DeviceEvent::Removed {
                address,
                reason: RemovalReason::Shutdown,
                remaining: 0,
            });
        }
        self.links.clear();
        released
    }

    #[cfg(test)]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }
}
