//! Link-layer transports the server accepts beacon links from.
//!
//! A [`Transport`] yields accepted links together with the peer's address.
//! A [`Link`] delivers whole messages: each `recv` returns one chunk as the
//! beacon sent it, truncated to the buffer if it was larger.
//!
//! - [`MemoryTransport`]: in-process links for tests and embedding
//! - `L2capTransport`: Bluetooth LE L2CAP sequential-packet sockets
//!   (feature `bluetooth`)

use std::io;

use async_trait::async_trait;
use doorwatch_core::DeviceAddress;

pub mod memory;

#[cfg(feature = "bluetooth")]
pub mod l2cap;

pub use memory::{BeaconPeer, MemoryConnector, MemoryLink, MemoryTransport};

#[cfg(feature = "bluetooth")]
pub use l2cap::{check_adapter, L2capLink, L2capTransport};

/// Source of accepted links.
#[async_trait]
pub trait Transport: Send + 'static {
    type Link: Link;

    /// Waits for the next inbound link.
    ///
    /// Errors are reported per call; the listener stays usable unless the
    /// caller decides otherwise.
    async fn accept(&mut self) -> io::Result<(Self::Link, DeviceAddress)>;
}

/// One accepted, message-oriented link.
///
/// Dropping the link releases it.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Receives one message into `buf`.
    ///
    /// `Ok(0)` means the peer closed the link.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Accept errors that say nothing about the listener's health.
pub fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
