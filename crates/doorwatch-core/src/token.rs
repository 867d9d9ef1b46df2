//! Delivery tokens used to reach a phone out-of-band.

use std::fmt;

/// Opaque push-delivery token reported by a beacon.
///
/// The full value is only handed to a [`Notifier`](crate::Notifier).
/// `Debug` and [`preview`](Self::preview) show a short prefix so tokens
/// never end up whole in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    /// Characters shown by [`preview`](Self::preview).
    pub const PREVIEW_CHARS: usize = 15;

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the full token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters (not bytes).
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a log-safe prefix such as `fr16uYX2SyGQ6ox...`.
    #[must_use]
    pub fn preview(&self) -> String {
        if self.len() <= Self::PREVIEW_CHARS {
            return self.0.clone();
        }
        let prefix: String = self.0.chars().take(Self::PREVIEW_CHARS).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeliveryToken").field(&self.preview()).finish()
    }
}

impl From<String> for DeliveryToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeliveryToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
