//! doorwatch daemon - BLE presence registry and door-close reminder trigger
//!
//! This crate provides the core infrastructure for the doorwatch daemon:
//! - `registry` - Device registry actor, the single owner of presence state
//! - `server` - Accepts beacon links and multiplexes their reads
//! - `frame` - Applies received frames (tokens, liveness) to the registry
//! - `heartbeat` - Evicts devices that went silent
//! - `trigger` - Armed/Watching state machine behind the reminder
//! - `notify` - Reminder queue, worker, and notifiers
//! - `lock` - Lock sensor poller
//! - `transport` - In-memory and L2CAP link layers
//! - `config`, `daemon` - Configuration and task wiring
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     doorwatchd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  DeviceServer   │────▶│     RegistryActor           │    │
//! │  │ (L2CAP links)   │     │  (device state owner)       │    │
//! │  └────────┬────────┘     └──────┬───────────────▲──────┘    │
//! │           │                     │               │           │
//! │           │ frames              │ last device   │ sweep     │
//! │           ▼                     ▼ left          │           │
//! │  ┌─────────────────┐     ┌──────────────┐ ┌─────┴───────┐   │
//! │  │ FrameProcessor  │     │  Trigger +   │ │  Heartbeat  │   │
//! │  │                 │     │  LockSensor  │ │  Monitor    │   │
//! │  └─────────────────┘     └──────┬───────┘ └─────────────┘   │
//! │                                 │ token                     │
//! │                                 ▼                           │
//! │                         ┌──────────────┐                    │
//! │                         │ Notification │                    │
//! │                         │   worker     │                    │
//! │                         └──────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod daemon;
pub mod frame;
pub mod heartbeat;
pub mod lock;
pub mod notify;
pub mod registry;
pub mod server;
pub mod transport;
pub mod trigger;
