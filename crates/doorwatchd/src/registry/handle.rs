//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to device events.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use std::time::Duration;

use doorwatch_core::{DeliveryToken, DeviceAddress, DeviceView, LinkId};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::commands::{
    Admission, DeviceEvent, RegistryCommand, RegistryError, RegistryStatus, RemovalReason,
};
use super::device::LinkHandle;
use crate::trigger::TriggerState;

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let link = LinkHandle::new(LinkId::new(1));
/// match handle.admit(address, link).await? {
///     Admission::Registered(view) => println!("new: {}", view.summary()),
///     Admission::Reconnected(view) => println!("back: {}", view.summary()),
/// }
///
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    event_sender: broadcast::Sender<DeviceEvent>,
}

impl RegistryHandle {
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command built around a fresh response channel and awaits the reply.
    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> RegistryCommand,
    ) -> Result<R, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Reconnect a known device or register a new one, atomically.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if a new device would exceed capacity
    /// - `RegistryError::InvalidParameter` if the link is already closed
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn admit(
        &self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<Admission, RegistryError> {
        self.request(|respond_to| RegistryCommand::Admit {
            address,
            link,
            respond_to,
        })
        .await?
    }

    /// Register a device that is not yet known.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyRegistered` if the address is present
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<DeviceView, RegistryError> {
        self.request(|respond_to| RegistryCommand::Register {
            address,
            link,
            respond_to,
        })
        .await?
    }

    /// Replace the link of a known device. The old link is closed first.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DeviceNotFound` if the address is absent
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn reconnect(
        &self,
        address: DeviceAddress,
        link: LinkHandle,
    ) -> Result<DeviceView, RegistryError> {
        self.request(|respond_to| RegistryCommand::Reconnect {
            address,
            link,
            respond_to,
        })
        .await?
    }

    /// Get a single device by address.
    ///
    /// Returns `None` if the device doesn't exist or if communication
    /// with the actor fails.
    pub async fn lookup(&self, address: DeviceAddress) -> Option<DeviceView> {
        self.request(|respond_to| RegistryCommand::Lookup {
            address,
            respond_to,
        })
        .await
        .ok()?
    }

    /// Get the device that currently owns `link`.
    pub async fn lookup_by_link(&self, link: LinkId) -> Option<DeviceView> {
        self.request(|respond_to| RegistryCommand::LookupByLink { link, respond_to })
            .await
            .ok()?
    }

    /// Whether one more device fits. `false` if the actor is gone.
    pub async fn has_capacity(&self) -> bool {
        self.request(|respond_to| RegistryCommand::HasCapacity { respond_to })
            .await
            .unwrap_or(false)
    }

    /// Get all devices as views, sorted by address.
    ///
    /// Returns an empty vector if no devices are registered or if
    /// communication with the actor fails.
    pub async fn get_all_devices(&self) -> Vec<DeviceView> {
        self.request(|respond_to| RegistryCommand::GetAllDevices { respond_to })
            .await
            .unwrap_or_default()
    }

    /// Registry-wide counters, or `None` if the actor is gone.
    pub async fn status(&self) -> Option<RegistryStatus> {
        self.request(|respond_to| RegistryCommand::GetStatus { respond_to })
            .await
            .ok()
    }

    pub async fn device_count(&self) -> usize {
        self.status().await.map(|s| s.device_count).unwrap_or(0)
    }

    /// Preview of the token kept from the last removed device.
    pub async fn last_vacated_token(&self) -> Option<String> {
        self.status().await?.last_vacated_token
    }

    pub async fn trigger_state(&self) -> Option<TriggerState> {
        self.status().await.map(|s| s.trigger)
    }

    /// Record an inbound frame on `link`, optionally replacing the token.
    ///
    /// # Errors
    ///
    /// - `RegistryError::LinkNotFound` if no device owns the link
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn apply_frame(
        &self,
        link: LinkId,
        token: Option<DeliveryToken>,
    ) -> Result<DeviceView, RegistryError> {
        self.request(|respond_to| RegistryCommand::ApplyFrame {
            link,
            token,
            respond_to,
        })
        .await?
    }

    /// Remove a device, closing its link.
    ///
    /// Returns `Ok(None)` if the device was not present.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove(
        &self,
        address: DeviceAddress,
        reason: RemovalReason,
    ) -> Result<Option<DeviceView>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Remove {
            address,
            reason,
            respond_to,
        })
        .await
    }

    /// Remove whichever device currently owns `link`.
    ///
    /// Returns `Ok(None)` if the link was replaced or already removed.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn remove_by_link(
        &self,
        link: LinkId,
        reason: RemovalReason,
    ) -> Result<Option<DeviceView>, RegistryError> {
        self.request(|respond_to| RegistryCommand::RemoveByLink {
            link,
            reason,
            respond_to,
        })
        .await
    }

    /// Evict devices idle for longer than `timeout`, returning how many went.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn sweep(&self, timeout: Duration) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Sweep {
            timeout,
            respond_to,
        })
        .await
    }

    /// Close every link, clear the table, and stop the actor.
    ///
    /// Returns the number of devices released.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has already stopped
    pub async fn shutdown(&self) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Shutdown { respond_to })
            .await
    }

    /// Subscribe to device events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_sender.subscribe()
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_handle() -> (RegistryHandle, mpsc::Receiver<RegistryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, _event_rx) = broadcast::channel(16);
        let handle = RegistryHandle::new(cmd_tx, event_tx);
        (handle, cmd_rx)
    }

    fn address() -> DeviceAddress {
        DeviceAddress::parse("A4:C1:38:0F:22:9B").unwrap()
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_remove_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(RegistryCommand::Remove {
                address,
                reason,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(address.as_str(), "A4:C1:38:0F:22:9B");
                assert_eq!(reason, RemovalReason::Explicit);
                let _ = respond_to.send(None);
                return true;
            }
            false
        });

        let result = handle.remove(address(), RemovalReason::Explicit).await;
        assert_eq!(result, Ok(None));
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_admit_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.admit(address(), LinkHandle::new(LinkId::new(1))).await;
        assert!(matches!(result, Err(RegistryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_dropped_responder_maps_to_channel_closed() {
        let (handle, mut rx) = create_test_handle();

        tokio::spawn(async move {
            // Receive and drop the command without answering
            let _ = rx.recv().await;
        });

        let result = handle.sweep(Duration::from_secs(60)).await;
        assert_eq!(result, Err(RegistryError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_queries_degrade_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.lookup(address()).await.is_none());
        assert!(handle.lookup_by_link(LinkId::new(1)).await.is_none());
        assert!(handle.get_all_devices().await.is_empty());
        assert!(!handle.has_capacity().await);
        assert_eq!(handle.device_count().await, 0);
        assert!(handle.status().await.is_none());
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());

        drop(rx);
        assert!(!handle.is_connected());
    }
}
