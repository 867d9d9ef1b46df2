//! Doorwatch Protocol - Beacon wire frames
//!
//! Each chunk a beacon writes on its link is one self-contained JSON record.
//! This crate turns such a chunk into a [`BeaconFrame`] without touching any
//! daemon state.

pub mod parse;

pub use parse::{parse_frame, BeaconFrame, FrameError};
