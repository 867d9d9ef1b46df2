//! Doorwatch Core - Shared types for BLE presence tracking
//!
//! This crate provides the core domain types shared between
//! the daemon (doorwatchd) and the wire protocol crate.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod address;
pub mod device;
pub mod error;
pub mod lock;
pub mod notify;
pub mod token;

// Re-exports for convenience
pub use address::{DeviceAddress, LinkId};
pub use device::DeviceView;
pub use error::{DomainError, DomainResult};
pub use lock::{LockSensor, LockState, SharedLockState};
pub use notify::{Notifier, NotifyError};
pub use token::DeliveryToken;
