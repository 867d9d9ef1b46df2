//! Read-only device snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeviceAddress, LinkId};

/// Snapshot of one registered beacon, safe to hand out of the registry.
///
/// The delivery token is only present as a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    pub address: DeviceAddress,
    pub link: LinkId,
    /// Token preview, `None` until the beacon sent a valid token
    pub token_preview: Option<String>,
    /// Wall-clock time of the first registration
    pub connected_at: DateTime<Utc>,
    /// Seconds since the last inbound frame or (re)connection
    pub idle_secs: u64,
    pub frames_received: u64,
    pub reconnects: u32,
}

impl DeviceView {
    pub fn has_token(&self) -> bool {
        self.token_preview.is_some()
    }

    /// One-line summary used in status logs.
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] token={} idle={}s frames={}",
            self.address,
            self.link,
            self.token_preview.as_deref().unwrap_or("waiting"),
            self.idle_secs,
            self.frames_received
        )
    }
}
