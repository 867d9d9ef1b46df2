//! Type-safe identifiers for beacons and their links.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Device Address
// ============================================================================

/// Stable link-layer address of a beacon device.
///
/// Always stored in canonical form: six upper-case hex octets separated by
/// colons (e.g., "A4:C1:38:0F:22:9B"). Two addresses compare equal exactly
/// when they name the same radio, regardless of how the input was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Number of octets in a Bluetooth device address.
    pub const OCTETS: usize = 6;

    /// Parses and canonicalizes an address.
    ///
    /// Accepts `:` or `-` separators and either hex case.
    pub fn parse(value: &str) -> DomainResult<Self> {
        let invalid = |reason: &str| DomainError::InvalidAddress {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(invalid("address is empty"));
        }

        let octets: Vec<&str> = trimmed.split([':', '-']).collect();
        if octets.len() != Self::OCTETS {
            return Err(invalid("expected six octets"));
        }

        let mut canonical = String::with_capacity(17);
        for (i, octet) in octets.iter().enumerate() {
            if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid("octets must be two hex digits"));
            }
            if i > 0 {
                canonical.push(':');
            }
            canonical.push_str(&octet.to_ascii_uppercase());
        }

        Ok(Self(canonical))
    }

    /// Builds an address from raw octets (most significant first).
    pub fn from_octets(octets: [u8; 6]) -> Self {
        let parts: Vec<String> = octets.iter().map(|b| format!("{b:02X}")).collect();
        Self(parts.join(":"))
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.0
    }
}

impl AsRef<str> for DeviceAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Link Identifier
// ============================================================================

/// Identifier of one accepted link.
///
/// Link ids are never reused within a daemon run, so a stale id can never
/// alias the link that replaced it after a reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(u64);

impl LinkId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}
