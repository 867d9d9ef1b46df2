//! Parsing beacon JSON frames.

use doorwatch_core::DeliveryToken;
use serde::Deserialize;
use thiserror::Error;

/// One decoded beacon frame.
///
/// Unknown fields are ignored so newer beacon firmware can add fields
/// without breaking older daemons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BeaconFrame {
    /// Push-delivery token of the phone carrying the beacon
    #[serde(default, alias = "token", alias = "delivery_token")]
    pub fcm_token: Option<String>,
}

impl BeaconFrame {
    /// Returns the token field, if present and non-empty.
    pub fn token(&self) -> Option<DeliveryToken> {
        self.fcm_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(DeliveryToken::from)
    }
}

/// Why a chunk could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Decodes one chunk into a [`BeaconFrame`].
///
/// Chunks longer than `max_len` are rejected outright rather than
/// truncated. Trailing NUL padding and whitespace written by some beacon
/// firmware is ignored.
pub fn parse_frame(chunk: &[u8], max_len: usize) -> Result<BeaconFrame, FrameError> {
    if chunk.len() > max_len {
        return Err(FrameError::TooLarge {
            size: chunk.len(),
            max: max_len,
        });
    }

    let text = std::str::from_utf8(chunk).map_err(|_| FrameError::InvalidUtf8)?;
    let text = text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.trim_start().is_empty() {
        return Err(FrameError::Empty);
    }

    // Require an object: serde would otherwise accept a positional array.
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(FrameError::Malformed("expected a JSON object".to_string()));
    }

    serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn test_parse_token_frame() {
        let frame = parse_frame(br#"{"fcm_token":"abc"}"#, MAX).unwrap();
        assert_eq!(frame.fcm_token.as_deref(), Some("abc"));
        assert_eq!(frame.token(), Some(DeliveryToken::new("abc")));
    }

    #[test]
    fn test_parse_accepts_token_alias() {
        let frame = parse_frame(br#"{"token":"abc"}"#, MAX).unwrap();
        assert_eq!(frame.fcm_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let frame = parse_frame(br#"{"battery":87,"fcm_token":"abc","rssi":-60}"#, MAX).unwrap();
        assert_eq!(frame.fcm_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_heartbeat_without_token() {
        let frame = parse_frame(br#"{"type":"heartbeat"}"#, MAX).unwrap();
        assert_eq!(frame.token(), None);
    }

    #[test]
    fn test_empty_token_is_absent() {
        let frame = parse_frame(br#"{"fcm_token":""}"#, MAX).unwrap();
        assert_eq!(frame.token(), None);
    }

    #[test]
    fn test_parse_trims_nul_padding() {
        let frame = parse_frame(b"{\"fcm_token\":\"abc\"}\0\0\n", MAX).unwrap();
        assert_eq!(frame.fcm_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_frame(b"", MAX), Err(FrameError::Empty));
        assert_eq!(parse_frame(b"\0\0", MAX), Err(FrameError::Empty));
        assert_eq!(parse_frame(&[0xff, 0xfe], MAX), Err(FrameError::InvalidUtf8));
        assert!(matches!(parse_frame(b"not json", MAX), Err(FrameError::Malformed(_))));
        assert!(matches!(parse_frame(br#"["abc"]"#, MAX), Err(FrameError::Malformed(_))));
        assert!(matches!(parse_frame(br#"{"fcm_token":42}"#, MAX), Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let chunk = vec![b' '; 17];
        assert_eq!(
            parse_frame(&chunk, 16),
            Err(FrameError::TooLarge { size: 17, max: 16 })
        );
    }
}
