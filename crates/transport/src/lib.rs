//! Rockwire Transport - Device sessions and command correlation
//!
//! This crate provides:
//! - `DeviceSession`: per-client sequence counter, nonce and endpoint
//! - `SessionCodec`: frame encoding stamped with session bookkeeping
//! - `DeviceClient`: send a command, await the reply matched by request id
//! - `Transport`: the seam to whatever actually moves bytes (LAN, MQTT, ...)
//! - An in-memory loopback transport and simulated device

mod device_client;
mod frame_codec;
mod loopback;
mod session;

pub use device_client::*;
pub use frame_codec::*;
pub use loopback::*;
pub use session::*;

use async_trait::async_trait;
use bytes::Bytes;
use rockwire_protocol::RoborockCommand;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Outbound half of a transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, device_id: &str, frame: Bytes) -> Result<(), TransportError>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Inbound traffic a transport hands to the client
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A raw frame received from a device
    Frame { device_id: String, data: Bytes },

    /// The transport lost its connection to a device
    Closed { device_id: String },
}

/// Anything that can run a command against a device and return its result
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(
        &self,
        device_id: &str,
        method: RoborockCommand,
        params: Vec<Value>,
    ) -> Result<Value, CommandError>;
}
