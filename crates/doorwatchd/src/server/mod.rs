//! Connection server for the doorwatch daemon.
//!
//! The server:
//! - Accepts beacon links from a [`Transport`] and admits them to the registry
//! - Multiplexes one pending read per admitted link in a single task
//! - Feeds every received chunk through the [`FrameProcessor`]
//! - Stops on cancellation, dropping the listener and every link
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                DeviceServer                  │
//! │                                              │
//! │  select! ─┬─ cancel token                    │
//! │           ├─ transport.accept() ──▶ admit    │
//! │           ├─ FuturesUnordered<LinkRead> ─┐   │
//! │           └─ poll timeout                │   │
//! └──────────────────────────────────────────┼───┘
//!                                            ▼
//!                                    FrameProcessor
//!                                            │
//!                                            ▼
//!                                   ┌─────────────────┐
//!                                   │  RegistryHandle │
//!                                   └─────────────────┘
//! ```
//!
//! Links are owned here; the registry only holds their [`LinkHandle`]s. When
//! the registry closes a handle (removal, reconnect, sweep), the link's
//! pending read resolves as evicted and the link is dropped.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-link failures remove that device and the loop continues
//! - Only listener failures and a vanished registry end the loop

mod reader;

pub use reader::{LinkRead, ReadOutcome};

use std::io;
use std::time::Duration;

use doorwatch_core::{DeviceAddress, LinkId};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::frame::FrameProcessor;
use crate::registry::{LinkHandle, RegistryError, RegistryHandle, RemovalReason};
use crate::transport::{is_transient, Transport};

/// Consecutive non-transient accept failures before the listener is
/// considered broken.
pub const MAX_ACCEPT_FAILURES: u32 = 5;

/// Counters reported when the server stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub rejected: u64,
    pub frames: u64,
}

/// What woke the loop.
enum LoopEvent<L> {
    Cancelled,
    Accepted(io::Result<(L, DeviceAddress)>),
    Read(LinkRead<L>),
    Idle,
}

/// Beacon connection server.
pub struct DeviceServer<T: Transport> {
    transport: T,
    registry: RegistryHandle,
    processor: FrameProcessor,
    poll_timeout: Duration,
    cancel_token: CancellationToken,

    /// Link ids are never reused within a run.
    next_link: u64,
    stats: ServerStats,
}

impl<T: Transport> DeviceServer<T> {
    pub fn new(
        transport: T,
        registry: RegistryHandle,
        processor: FrameProcessor,
        poll_timeout: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            transport,
            registry,
            processor,
            poll_timeout,
            cancel_token,
            next_link: 0,
            stats: ServerStats::default(),
        }
    }

    /// Runs the server until cancelled.
    ///
    /// # Errors
    ///
    /// - `ServerError::Multiplex` after [`MAX_ACCEPT_FAILURES`] consecutive
    ///   accept failures
    /// - `ServerError::Registry` if the registry actor is gone
    pub async fn run(mut self) -> Result<ServerStats, ServerError> {
        info!(
            max_frame_size = self.processor.max_frame_size(),
            poll_timeout_secs = self.poll_timeout.as_secs(),
            "Device server running"
        );

        let mut reads: FuturesUnordered<BoxFuture<'static, LinkRead<T::Link>>> =
            FuturesUnordered::new();
        let mut accept_failures: u32 = 0;

        loop {
            let event = tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => LoopEvent::Cancelled,

                accepted = self.transport.accept() => LoopEvent::Accepted(accepted),

                Some(read) = reads.next(), if !reads.is_empty() => LoopEvent::Read(read),

                // Bounded wait so a quiet radio never parks the loop indefinitely.
                _ = tokio::time::sleep(self.poll_timeout) => LoopEvent::Idle,
            };

            match event {
                LoopEvent::Cancelled => {
                    info!(links = reads.len(), "Server shutdown requested");
                    break;
                }
                LoopEvent::Accepted(Ok((link, address))) => {
                    accept_failures = 0;
                    if let Some(read) = self.admit(link, address).await? {
                        reads.push(read);
                    }
                }
                LoopEvent::Accepted(Err(e)) if is_transient(e.kind()) => {
                    debug!(error = %e, "Transient accept failure");
                }
                LoopEvent::Accepted(Err(e)) => {
                    accept_failures += 1;
                    error!(
                        error = %e,
                        failures = accept_failures,
                        "Failed to accept connection"
                    );
                    if accept_failures >= MAX_ACCEPT_FAILURES {
                        return Err(ServerError::Multiplex(format!(
                            "{accept_failures} consecutive accept failures, last: {e}"
                        )));
                    }
                }
                LoopEvent::Read(read) => {
                    if let Some(rearmed) = self.handle_read(read).await? {
                        reads.push(rearmed);
                    }
                }
                LoopEvent::Idle => {
                    debug!(links = reads.len(), "Poll timeout, no activity");
                }
            }
        }

        // Dropping the pending reads releases every link; the listener goes with self.
        drop(reads);
        info!(
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            frames = self.stats.frames,
            "Device server stopped"
        );
        Ok(self.stats)
    }

    /// Admits a freshly accepted link, returning its first read if admitted.
    async fn admit(
        &mut self,
        link: T::Link,
        address: DeviceAddress,
    ) -> Result<Option<BoxFuture<'static, LinkRead<T::Link>>>, ServerError> {
        self.next_link += 1;
        let handle = LinkHandle::new(LinkId::new(self.next_link));

        match self.registry.admit(address.clone(), handle.clone()).await {
            Ok(admission) => {
                self.stats.accepted += 1;
                debug!(
                    address = %address,
                    link = %handle.id(),
                    reconnect = admission.is_reconnect(),
                    "Link admitted"
                );
                Ok(Some(reader::arm(link, handle, self.processor.max_frame_size())))
            }
            Err(RegistryError::RegistryFull { max }) => {
                self.stats.rejected += 1;
                warn!(address = %address, max, "Registry full, rejecting connection");
                Ok(None)
            }
            Err(RegistryError::ChannelClosed) => {
                Err(ServerError::Registry(RegistryError::ChannelClosed))
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!(address = %address, error = %e, "Rejecting connection");
                Ok(None)
            }
        }
    }

    /// Handles one finished read, returning the next read if the link stays armed.
    async fn handle_read(
        &mut self,
        read: LinkRead<T::Link>,
    ) -> Result<Option<BoxFuture<'static, LinkRead<T::Link>>>, ServerError> {
        let LinkRead {
            link,
            handle,
            outcome,
        } = read;
        let link_id = handle.id();

        let applied = match outcome {
            ReadOutcome::Frame(chunk) => {
                self.stats.frames += 1;
                self.processor.process(&self.registry, link_id, &chunk).await
            }
            ReadOutcome::Oversized(size) => {
                self.stats.frames += 1;
                self.processor
                    .process_oversized(&self.registry, link_id, size)
                    .await
            }
            ReadOutcome::Closed => {
                debug!(link = %link_id, "Peer closed link");
                release(&self.registry, link_id, RemovalReason::Disconnected).await?;
                return Ok(None);
            }
            ReadOutcome::Evicted => {
                debug!(link = %link_id, "Link closed by registry");
                return Ok(None);
            }
            ReadOutcome::Failed(e)
                if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) =>
            {
                debug!(link = %link_id, error = %e, "Transient read failure, re-arming");
                return Ok(Some(self.rearm(link, handle)));
            }
            ReadOutcome::Failed(e) => {
                warn!(link = %link_id, error = %e, "Link read failed");
                release(&self.registry, link_id, RemovalReason::LinkError).await?;
                return Ok(None);
            }
        };

        match applied {
            Ok(_) => Ok(Some(self.rearm(link, handle))),
            Err(RegistryError::ChannelClosed) => {
                Err(ServerError::Registry(RegistryError::ChannelClosed))
            }
            Err(e) => {
                // The device went away between the read and its application.
                debug!(link = %link_id, error = %e, "Dropping link without a device");
                Ok(None)
            }
        }
    }

    fn rearm(&self, link: T::Link, handle: LinkHandle) -> BoxFuture<'static, LinkRead<T::Link>> {
        reader::arm(link, handle, self.processor.max_frame_size())
    }
}

/// Removes whichever device still owns `link`.
async fn release(
    registry: &RegistryHandle,
    link: LinkId,
    reason: RemovalReason,
) -> Result<(), ServerError> {
    registry.remove_by_link(link, reason).await?;
    Ok(())
}

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be set up.
    #[error("failed to initialize link layer: {0}")]
    HardwareInit(String),

    /// The accept/read loop cannot continue.
    #[error("connection multiplexing failed: {0}")]
    Multiplex(String),

    #[error("registry unavailable: {0}")]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::HardwareInit("no adapter".to_string());
        assert!(err.to_string().contains("no adapter"));

        let err = ServerError::Multiplex("5 consecutive accept failures".to_string());
        assert!(err.to_string().contains("5 consecutive"));

        let err: ServerError = RegistryError::ChannelClosed.into();
        assert_eq!(err.to_string(), "registry unavailable: response channel closed");
    }
}
