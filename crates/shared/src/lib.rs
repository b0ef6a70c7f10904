//! Wayfinder protocol - shared types for engine/client communication.
//!
//! This crate contains every type that crosses the WebSocket or the pub/sub
//! bus: client and server messages, the versioned delta envelope, the
//! area-of-interest payload, and the uniform command result.
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - only serde, serde_json, and thiserror
//! 2. **No business logic** - pure data types and serialization
//! 3. **Closed sums** - messages and changes are tagged enums, not loose maps

pub mod command;
pub mod deltas;
pub mod messages;

pub use command::{CommandError, CommandResult};
pub use deltas::{AoiArea, AoiPlayer, Change, ZoneInfo, DELTA_VERSION};
pub use messages::{ClientMessage, ServerMessage, WireError};
