//! Notification delivery seam.

use thiserror::Error;

use crate::DeliveryToken;

/// Errors reported by a [`Notifier`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// The delivery backend could not be reached or failed mid-request.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// The delivery program could not be started.
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The backend answered but refused the notification.
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Sends the door-close reminder to the phone behind a delivery token.
///
/// `notify` is a single blocking call from the daemon's point of view. It may
/// sign requests and talk to the network, but it must not touch the registry.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, token: &DeliveryToken) -> Result<(), NotifyError>;
}
