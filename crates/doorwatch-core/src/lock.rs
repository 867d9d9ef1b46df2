//! Door lock state and the sensor seam.
//!
//! The physical sensor is interrupt driven. Whatever drives it only ever
//! writes a single atomically-read value, which the daemon polls through
//! [`LockSensor::read_lock_state`].

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lock state as last reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
    /// Sensor not initialized or reading failed.
    #[default]
    Unknown,
}

impl LockState {
    const RAW_LOCKED: u8 = 0;
    const RAW_UNLOCKED: u8 = 1;
    const RAW_UNKNOWN: u8 = 2;

    fn to_raw(self) -> u8 {
        match self {
            Self::Locked => Self::RAW_LOCKED,
            Self::Unlocked => Self::RAW_UNLOCKED,
            Self::Unknown => Self::RAW_UNKNOWN,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            Self::RAW_LOCKED => Self::Locked,
            Self::RAW_UNLOCKED => Self::Unlocked,
            _ => Self::Unknown,
        }
    }

    /// Maps a GPIO level to a lock state.
    ///
    /// The sensor pulls the line high while the bolt is retracted.
    pub fn from_gpio_level(level: &str) -> Self {
        match level.trim() {
            "1" => Self::Unlocked,
            "0" => Self::Locked,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Source of the current lock state.
///
/// Implementations must be non-blocking and always return the last known
/// value.
pub trait LockSensor: Send + Sync + 'static {
    fn read_lock_state(&self) -> LockState;
}

/// A fixed state is a valid sensor (handy for tests and dry runs).
impl LockSensor for LockState {
    fn read_lock_state(&self) -> LockState {
        *self
    }
}

/// Lock state cell shared between a writer (interrupt handler, poller)
/// and readers.
///
/// Cloning shares the same underlying value.
#[derive(Debug, Clone)]
pub struct SharedLockState {
    raw: Arc<AtomicU8>,
}

impl SharedLockState {
    pub fn new(initial: LockState) -> Self {
        Self {
            raw: Arc::new(AtomicU8::new(initial.to_raw())),
        }
    }

    /// Stores a new state, returning the previous one.
    pub fn set(&self, state: LockState) -> LockState {
        LockState::from_raw(self.raw.swap(state.to_raw(), Ordering::AcqRel))
    }

    pub fn get(&self) -> LockState {
        LockState::from_raw(self.raw.load(Ordering::Acquire))
    }
}

impl Default for SharedLockState {
    fn default() -> Self {
        Self::new(LockState::Unknown)
    }
}

impl LockSensor for SharedLockState {
    fn read_lock_state(&self) -> LockState {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_state_is_shared_between_clones() {
        let writer = SharedLockState::default();
        let reader = writer.clone();
        assert_eq!(reader.read_lock_state(), LockState::Unknown);

        let previous = writer.set(LockState::Unlocked);
        assert_eq!(previous, LockState::Unknown);
        assert_eq!(reader.read_lock_state(), LockState::Unlocked);
    }

    #[test]
    fn test_gpio_level_mapping() {
        assert_eq!(LockState::from_gpio_level("1\n"), LockState::Unlocked);
        assert_eq!(LockState::from_gpio_level("0"), LockState::Locked);
        assert_eq!(LockState::from_gpio_level(""), LockState::Unknown);
        assert_eq!(LockState::from_gpio_level("x"), LockState::Unknown);
    }

    #[test]
    fn test_fixed_state_sensor() {
        assert_eq!(LockState::Locked.read_lock_state(), LockState::Locked);
    }

    #[test]
    fn test_display() {
        assert_eq!(LockState::Unlocked.to_string(), "unlocked");
        assert_eq!(LockState::Unknown.to_string(), "unknown");
    }
}
