//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `DeviceEvent`: Events published by the registry for subscribers
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::time::Duration;

use doorwatch_core::{DeliveryToken, DeviceAddress, DeviceView, LinkId};
use thiserror::Error;
use tokio::sync::oneshot;

use super::device::LinkHandle;
use crate::trigger::{TriggerOutcome, TriggerState};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response, so callers get
/// request-response semantics while every mutation is still applied by the
/// actor alone, one command at a time.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Reconnect the device if its address is known, otherwise register it.
    ///
    /// Lookup and mutation happen in one step, so an admission can never
    /// interleave with an eviction of the same address.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if a new device would exceed capacity
    /// - `RegistryError::InvalidParameter` if the link is already closed
    Admit {
        address: DeviceAddress,
        link: LinkHandle,
        respond_to: oneshot::Sender<Result<Admission, RegistryError>>,
    },

    /// Register a device that is not yet known.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::AlreadyRegistered` if the address is present
    Register {
        address: DeviceAddress,
        link: LinkHandle,
        respond_to: oneshot::Sender<Result<DeviceView, RegistryError>>,
    },

    /// Replace the link of a known device, keeping its token.
    ///
    /// # Errors
    /// - `RegistryError::DeviceNotFound` if the address is absent
    Reconnect {
        address: DeviceAddress,
        link: LinkHandle,
        respond_to: oneshot::Sender<Result<DeviceView, RegistryError>>,
    },

    /// Get a device by address.
    Lookup {
        address: DeviceAddress,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },

    /// Get the device currently owning a link.
    LookupByLink {
        link: LinkId,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },

    /// Whether one more device can be registered.
    HasCapacity {
        respond_to: oneshot::Sender<bool>,
    },

    /// Get all devices as views.
    GetAllDevices {
        respond_to: oneshot::Sender<Vec<DeviceView>>,
    },

    /// Get registry-wide counters and trigger state.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Record an inbound frame on a link.
    ///
    /// Always refreshes the device's last-seen time; replaces the token
    /// when one is given.
    ///
    /// # Errors
    /// - `RegistryError::LinkNotFound` if no device owns the link
    ApplyFrame {
        link: LinkId,
        token: Option<DeliveryToken>,
        respond_to: oneshot::Sender<Result<DeviceView, RegistryError>>,
    },

    /// Remove a device by address. Absent addresses are a no-op.
    Remove {
        address: DeviceAddress,
        reason: RemovalReason,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },

    /// Remove whichever device owns a link. Unowned links are a no-op.
    RemoveByLink {
        link: LinkId,
        reason: RemovalReason,
        respond_to: oneshot::Sender<Option<DeviceView>>,
    },

    /// Evict every device idle for longer than `timeout`.
    ///
    /// Responds with the number of devices removed.
    Sweep {
        timeout: Duration,
        respond_to: oneshot::Sender<usize>,
    },

    /// Close every link, drop all devices, and stop the actor.
    ///
    /// Responds with the number of devices released. The notification
    /// trigger is not evaluated.
    Shutdown {
        respond_to: oneshot::Sender<usize>,
    },
}

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Registered(DeviceView),
    Reconnected(DeviceView),
}

impl Admission {
    pub fn view(&self) -> &DeviceView {
        match self {
            Self::Registered(view) | Self::Reconnected(view) => view,
        }
    }

    pub fn is_reconnect(&self) -> bool {
        matches!(self, Self::Reconnected(_))
    }
}

/// Registry-wide counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatus {
    pub device_count: usize,
    pub max_devices: usize,
    pub trigger: TriggerState,
    /// Preview of the token saved from the last removed device
    pub last_vacated_token: Option<String>,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry has reached its maximum device capacity.
    #[error("registry is full (max: {max} devices)")]
    RegistryFull { max: usize },

    #[error("device not found: {0}")]
    DeviceNotFound(DeviceAddress),

    #[error("no device owns {0}")]
    LinkNotFound(LinkId),

    #[error("device already registered: {0}")]
    AlreadyRegistered(DeviceAddress),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Device Events
// ============================================================================

/// Events published by the registry to subscribers.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Registered {
        address: DeviceAddress,
        link: LinkId,
    },

    Reconnected {
        address: DeviceAddress,
        link: LinkId,
    },

    /// A device reported a new valid delivery token.
    TokenUpdated { address: DeviceAddress },

    Removed {
        address: DeviceAddress,
        reason: RemovalReason,
        remaining: usize,
    },

    /// The last device left and the notification condition was evaluated.
    Vacated { outcome: TriggerOutcome },
}

/// Reason why a device was removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The beacon closed its link.
    Disconnected,

    /// No traffic within the heartbeat timeout.
    Timeout,

    /// Reading from the link failed.
    LinkError,

    /// Removed on request.
    Explicit,

    /// The daemon is stopping.
    Shutdown,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Timeout => write!(f, "timeout"),
            Self::LinkError => write!(f, "link error"),
            Self::Explicit => write!(f, "explicitly removed"),
            Self::Shutdown => write!(f, "daemon shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::RegistryFull { max: 10 };
        assert_eq!(err.to_string(), "registry is full (max: 10 devices)");

        let addr = DeviceAddress::parse("A4:C1:38:0F:22:9B").unwrap();
        let err = RegistryError::DeviceNotFound(addr.clone());
        assert_eq!(err.to_string(), "device not found: A4:C1:38:0F:22:9B");

        let err = RegistryError::AlreadyRegistered(addr);
        assert_eq!(err.to_string(), "device already registered: A4:C1:38:0F:22:9B");

        let err = RegistryError::LinkNotFound(LinkId::new(4));
        assert_eq!(err.to_string(), "no device owns link-4");

        assert_eq!(RegistryError::ChannelClosed.to_string(), "response channel closed");
    }

    #[test]
    fn test_removal_reason_display() {
        assert_eq!(RemovalReason::Disconnected.to_string(), "disconnected");
        assert_eq!(RemovalReason::Timeout.to_string(), "timeout");
        assert_eq!(RemovalReason::LinkError.to_string(), "link error");
        assert_eq!(RemovalReason::Shutdown.to_string(), "daemon shutdown");
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        let (tx, rx) = oneshot::channel::<Result<DeviceView, RegistryError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
