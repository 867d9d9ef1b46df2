//! Registry-owned device records and link handles.

use chrono::{DateTime, Utc};
use doorwatch_core::{DeliveryToken, DeviceAddress, DeviceView, LinkId};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

// ============================================================================
// Link Handle
// ============================================================================

/// The registry's grip on one accepted link.
///
/// The server owns the link itself and reads from it; the registry only
/// holds this handle. Closing the handle tells whoever reads the link to
/// drop it, which releases the underlying socket. Clones share the same
/// closed state, and closing twice is harmless.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    id: LinkId,
    closer: CancellationToken,
}

impl LinkHandle {
    pub fn new(id: LinkId) -> Self {
        Self {
            id,
            closer: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Requests the link be released.
    pub fn close(&self) {
        self.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled()
    }

    /// Completes once [`close`](Self::close) has been called on any clone.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closer.cancelled()
    }
}

// ============================================================================
// Device Record
// ============================================================================

/// One registered beacon, as held by the registry actor.
#[derive(Debug)]
pub(crate) struct Device {
    pub(crate) address: DeviceAddress,
    pub(crate) token: Option<DeliveryToken>,
    pub(crate) link: LinkHandle,
    pub(crate) last_seen: Instant,
    pub(crate) connected_at: DateTime<Utc>,
    pub(crate) frames_received: u64,
    pub(crate) reconnects: u32,
}

impl Device {
    pub(crate) fn new(address: DeviceAddress, link: LinkHandle, now: Instant) -> Self {
        Self {
            address,
            token: None,
            link,
            last_seen: now,
            connected_at: Utc::now(),
            frames_received: 0,
            reconnects: 0,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    /// Swaps in a fresh link and closes the old one.
    ///
    /// The token survives; only the transport changed.
    pub(crate) fn replace_link(&mut self, link: LinkHandle, now: Instant) -> LinkHandle {
        self.link.close();
        let old = std::mem::replace(&mut self.link, link);
        self.last_seen = now;
        self.reconnects = self.reconnects.saturating_add(1);
        old
    }

    pub(crate) fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub(crate) fn view(&self, now: Instant) -> DeviceView {
        DeviceView {
            address: self.address.clone(),
            link: self.link.id(),
            token_preview: self.token.as_ref().map(DeliveryToken::preview),
            connected_at: self.connected_at,
            idle_secs: self.idle_for(now).as_secs(),
            frames_received: self.frames_received,
            reconnects: self.reconnects,
        }
    }
}
