//! In-process transport.
//!
//! Each link behaves like a sequential-packet socket: messages keep their
//! boundaries, oversized messages are truncated to the receive buffer, and a
//! closed peer reads as `Ok(0)`. Errors can be injected on both the listener
//! and individual links.

use std::io;

use async_trait::async_trait;
use doorwatch_core::DeviceAddress;
use tokio::sync::{mpsc, Mutex};

use super::{Link, Transport};

/// Pending connections before `connect` waits.
const ACCEPT_BACKLOG: usize = 32;

type Inbound = Result<(MemoryLink, DeviceAddress), io::ErrorKind>;
type Message = Result<Vec<u8>, io::ErrorKind>;

// ============================================================================
// Listener side
// ============================================================================

/// Listener half of the in-memory transport.
pub struct MemoryTransport {
    incoming: mpsc::Receiver<Inbound>,
}

impl MemoryTransport {
    /// Creates a listener and the connector used to reach it.
    pub fn channel() -> (Self, MemoryConnector) {
        let (sender, incoming) = mpsc::channel(ACCEPT_BACKLOG);
        (Self { incoming }, MemoryConnector { sender })
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Link = MemoryLink;

    async fn accept(&mut self) -> io::Result<(MemoryLink, DeviceAddress)> {
        match self.incoming.recv().await {
            Some(Ok(accepted)) => Ok(accepted),
            Some(Err(kind)) => Err(io::Error::new(kind, "injected accept failure")),
            // No connector left: nothing will ever arrive, idle like a quiet radio.
            None => std::future::pending().await,
        }
    }
}

/// Server-side end of an in-memory link.
pub struct MemoryLink {
    inbox: Mutex<mpsc::UnboundedReceiver<Message>>,
}

#[async_trait]
impl Link for MemoryLink {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            None => Ok(0),
            Some(Err(kind)) => Err(io::Error::new(kind, "injected link failure")),
            Some(Ok(message)) => {
                let mut copied = 0;
                for (dst, src) in buf.iter_mut().zip(message.iter()) {
                    *dst = *src;
                    copied += 1;
                }
                Ok(copied)
            }
        }
    }
}

// ============================================================================
// Beacon side
// ============================================================================

/// Opens links to a [`MemoryTransport`]. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    sender: mpsc::Sender<Inbound>,
}

impl MemoryConnector {
    /// Connects as the beacon with `address`.
    ///
    /// # Errors
    ///
    /// `NotConnected` if the listener is gone.
    pub async fn connect(&self, address: DeviceAddress) -> io::Result<BeaconPeer> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let link = MemoryLink {
            inbox: Mutex::new(inbox),
        };
        self.sender
            .send(Ok((link, address.clone())))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))?;
        Ok(BeaconPeer { address, outbox })
    }

    /// Makes the listener's next `accept` fail with `kind`.
    pub async fn fail_accept(&self, kind: io::ErrorKind) -> io::Result<()> {
        self.sender
            .send(Err(kind))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::NotConnected, "listener closed"))
    }
}

/// Beacon end of an in-memory link. Dropping it closes the link.
pub struct BeaconPeer {
    address: DeviceAddress,
    outbox: mpsc::UnboundedSender<Message>,
}

impl BeaconPeer {
    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// `BrokenPipe` once the server released the link.
    pub fn send(&self, message: impl Into<Vec<u8>>) -> io::Result<()> {
        self.outbox
            .send(Ok(message.into()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link released"))
    }

    /// Makes the server's next read on this link fail with `kind`.
    pub fn fail(&self, kind: io::ErrorKind) -> io::Result<()> {
        self.outbox
            .send(Err(kind))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "link released"))
    }

    /// Whether the server dropped its end of the link.
    pub fn is_released(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Waits until the server drops its end of the link.
    pub async fn released(&self) {
        self.outbox.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> DeviceAddress {
        DeviceAddress::parse("A4:C1:38:0F:22:9B").unwrap()
    }

    #[tokio::test]
    async fn test_connect_and_receive_message() {
        let (mut transport, connector) = MemoryTransport::channel();
        let peer = connector.connect(addr()).await.unwrap();
        let (link, address) = transport.accept().await.unwrap();
        assert_eq!(address, addr());

        peer.send(b"hello".to_vec()).unwrap();
        let mut buf = [0u8; 16];
        let n = link.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn test_oversized_message_is_truncated() {
        let (mut transport, connector) = MemoryTransport::channel();
        let peer = connector.connect(addr()).await.unwrap();
        let (link, _) = transport.accept().await.unwrap();

        peer.send(vec![b'x'; 10]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(link.recv(&mut buf).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_peer_drop_reads_as_zero() {
        let (mut transport, connector) = MemoryTransport::channel();
        let peer = connector.connect(addr()).await.unwrap();
        let (link, _) = transport.accept().await.unwrap();

        drop(peer);
        let mut buf = [0u8; 4];
        assert_eq!(link.recv(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_link_drop_is_visible_to_peer() {
        let (mut transport, connector) = MemoryTransport::channel();
        let peer = connector.connect(addr()).await.unwrap();
        let (link, _) = transport.accept().await.unwrap();
        assert!(!peer.is_released());

        drop(link);
        peer.released().await;
        assert!(peer.send(b"late".to_vec()).is_err());
    }

    #[tokio::test]
    async fn test_injected_errors() {
        let (mut transport, connector) = MemoryTransport::channel();
        connector.fail_accept(io::ErrorKind::PermissionDenied).await.unwrap();
        let err = transport.accept().await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let peer = connector.connect(addr()).await.unwrap();
        let (link, _) = transport.accept().await.unwrap();
        peer.fail(io::ErrorKind::ConnectionReset).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(link.recv(&mut buf).await.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }
}
