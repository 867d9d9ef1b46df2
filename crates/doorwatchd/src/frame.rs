//! Frame processing: turns one received chunk into a registry update.
//!
//! Every chunk counts as proof of life, whether or not it parses. Only a
//! well-formed frame carrying a long enough token changes the device's
//! token; anything else is logged and otherwise ignored.

use doorwatch_core::{DeliveryToken, DeviceView, LinkId};
use doorwatch_protocol::{parse_frame, FrameError};
use tracing::{debug, warn};

use crate::registry::{RegistryError, RegistryHandle};

/// What a chunk means for its device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameVerdict {
    /// Valid frame without a token.
    Heartbeat,
    /// Valid frame with an acceptable token.
    Token(DeliveryToken),
    /// Token present but shorter than the minimum.
    ShortToken { len: usize },
    /// Chunk could not be decoded.
    Rejected(FrameError),
}

/// Applies inbound chunks to the registry.
#[derive(Debug, Clone, Copy)]
pub struct FrameProcessor {
    min_token_length: usize,
    max_frame_size: usize,
}

impl FrameProcessor {
    pub fn new(min_token_length: usize, max_frame_size: usize) -> Self {
        Self {
            min_token_length,
            max_frame_size,
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Classifies a chunk without touching the registry.
    pub fn interpret(&self, chunk: &[u8]) -> FrameVerdict {
        let frame = match parse_frame(chunk, self.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => return FrameVerdict::Rejected(e),
        };

        match frame.token() {
            None => FrameVerdict::Heartbeat,
            Some(token) if token.len() >= self.min_token_length => FrameVerdict::Token(token),
            Some(token) => FrameVerdict::ShortToken { len: token.len() },
        }
    }

    /// Records `chunk` against the device owning `link`.
    ///
    /// # Errors
    ///
    /// Only registry errors propagate (the link lost its device, or the actor
    /// is gone). Bad chunks are not errors.
    pub async fn process(
        &self,
        registry: &RegistryHandle,
        link: LinkId,
        chunk: &[u8],
    ) -> Result<DeviceView, RegistryError> {
        let verdict = self.interpret(chunk);
        let token = match &verdict {
            FrameVerdict::Token(token) => Some(token.clone()),
            _ => None,
        };

        let view = registry.apply_frame(link, token).await?;

        match verdict {
            FrameVerdict::Heartbeat | FrameVerdict::Token(_) => {
                debug!(address = %view.address, bytes = chunk.len(), "Frame received");
            }
            FrameVerdict::ShortToken { len } => {
                warn!(
                    address = %view.address,
                    len,
                    min = self.min_token_length,
                    "Token too short, keeping previous token"
                );
            }
            FrameVerdict::Rejected(e) => {
                warn!(address = %view.address, error = %e, "Discarding unparseable frame");
            }
        }

        Ok(view)
    }

    /// Records a chunk that did not fit the receive buffer.
    ///
    /// The content is dropped but the device is still alive.
    pub async fn process_oversized(
        &self,
        registry: &RegistryHandle,
        link: LinkId,
        size: usize,
    ) -> Result<DeviceView, RegistryError> {
        let view = registry.apply_frame(link, None).await?;
        warn!(
            address = %view.address,
            size,
            max = self.max_frame_size,
            "Discarding oversized frame"
        );
        Ok(view)
    }
}
