//! Bluetooth LE L2CAP transport (BlueZ via bluer).
//!
//! Beacons open a connection-oriented channel on a fixed PSM using
//! sequential-packet sockets, so every `recv` yields exactly one frame.

use std::io;

use async_trait::async_trait;
use bluer::l2cap::{SeqPacket, SeqPacketListener, SocketAddr};
use bluer::{Address, AddressType};
use doorwatch_core::DeviceAddress;
use tracing::info;

use super::{Link, Transport};

/// Listens for beacon channels on one PSM.
pub struct L2capTransport {
    listener: SeqPacketListener,
}

impl L2capTransport {
    /// Binds a listener on every local adapter.
    ///
    /// # Errors
    ///
    /// Fails if the PSM is taken or the process lacks the capability to bind
    /// Bluetooth sockets.
    pub async fn bind(psm: u16) -> io::Result<Self> {
        let local = SocketAddr::new(Address::any(), AddressType::LePublic, psm);
        let listener = SeqPacketListener::bind(local).await?;
        info!(psm = format_args!("{psm:#06x}"), "L2CAP listener bound");
        Ok(Self { listener })
    }
}

#[async_trait]
impl Transport for L2capTransport {
    type Link = L2capLink;

    async fn accept(&mut self) -> io::Result<(L2capLink, DeviceAddress)> {
        let (socket, peer) = self.listener.accept().await?;
        Ok((L2capLink { socket }, DeviceAddress::from_octets(peer.addr.0)))
    }
}

/// One accepted L2CAP channel.
pub struct L2capLink {
    socket: SeqPacket,
}

#[async_trait]
impl Link for L2capLink {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf).await
    }
}

/// Checks that a Bluetooth adapter is present and powers it on.
///
/// Returns the adapter name.
///
/// # Errors
///
/// Fails if bluetoothd is unreachable or no adapter exists.
pub async fn check_adapter() -> io::Result<String> {
    let session = bluer::Session::new().await.map_err(io::Error::other)?;
    let adapter = session.default_adapter().await.map_err(io::Error::other)?;
    adapter.set_powered(true).await.map_err(io::Error::other)?;
    Ok(adapter.name().to_string())
}
