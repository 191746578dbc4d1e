//! Rockwire Protocol - Frame definitions and command envelopes
//!
//! This crate defines the data that crosses the wire to a Roborock device:
//! - `FrameCodec`: the `1.0` binary frame with encrypted payload and CRC32 trailer
//! - `CommandBuilder`: request ids, the security block and the DPS envelope
//! - `RoborockCommand`: the typed catalogue of RPC method names
//! - Typed result containers parsed from device replies

mod command;
mod containers;
mod frame;
mod registry;
mod validation;

pub use command::*;
pub use containers::*;
pub use frame::*;
pub use registry::*;
pub use validation::*;
