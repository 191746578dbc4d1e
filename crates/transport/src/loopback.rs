//! In-memory transport and simulated device
//!
//! `loopback()` hands out two halves joined by channels: a `LoopbackTransport`
//! the client sends through, and a `LoopbackDevice` that sees every outgoing
//! frame and can push frames back. `SimulatedDevice` sits on the device half
//! and answers requests the way firmware would.

use crate::frame_codec::SessionCodec;
use crate::session::DeviceSession;
use crate::{InboundEvent, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rockwire_protocol::{
    wrap_response, CommandRequest, DpsEnvelope, EnvelopeError, RpcOutcome, DPS_REQUEST_KEY,
    PROTOCOL_RPC_REQUEST, PROTOCOL_RPC_RESPONSE,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const INBOUND_CAPACITY: usize = 256;

/// Create a connected transport/device pair
pub fn loopback() -> (LoopbackTransport, LoopbackDevice) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, _) = mpsc::channel(1);

    (
        LoopbackTransport { outbound: outbound_tx },
        LoopbackDevice {
            outbound: outbound_rx,
            inbound: Mutex::new(inbound_tx),
        },
    )
}

/// Client half of a loopback pair
pub struct LoopbackTransport {
    outbound: mpsc::UnboundedSender<(String, Bytes)>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, device_id: &str, frame: Bytes) -> Result<(), TransportError> {
        self.outbound
            .send((device_id.to_string(), frame))
            .map_err(|_| TransportError::Closed)
    }
}

/// Device half of a loopback pair
pub struct LoopbackDevice {
    outbound: mpsc::UnboundedReceiver<(String, Bytes)>,
    inbound: Mutex<mpsc::Sender<InboundEvent>>,
}

impl LoopbackDevice {
    /// Open the channel the client reads device traffic from.
    ///
    /// Only the most recently opened receiver gets traffic.
    pub fn inbound_receiver(&self) -> mpsc::Receiver<InboundEvent> {
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        *self.inbound.lock() = tx;
        rx
    }

    /// Next frame the client sent, with its target device id
    pub async fn recv(&mut self) -> Option<(String, Bytes)> {
        self.outbound.recv().await
    }

    /// Next frame the client sent, if one is already queued
    pub fn try_recv(&mut self) -> Option<(String, Bytes)> {
        self.outbound.try_recv().ok()
    }

    /// Push a raw frame to the client as if `device_id` sent it
    pub async fn deliver(&self, device_id: &str, data: Bytes) -> Result<(), TransportError> {
        let tx = self.inbound.lock().clone();
        tx.send(InboundEvent::Frame {
            device_id: device_id.to_string(),
            data,
        })
        .await
        .map_err(|_| TransportError::Closed)
    }

    /// Report a lost connection to the client
    pub async fn close(&self, device_id: &str) -> Result<(), TransportError> {
        let tx = self.inbound.lock().clone();
        tx.send(InboundEvent::Closed {
            device_id: device_id.to_string(),
        })
        .await
        .map_err(|_| TransportError::Closed)
    }
}

/// Pull the inner request out of a decrypted request payload
pub fn parse_request(payload: &[u8]) -> Result<CommandRequest, EnvelopeError> {
    let envelope = DpsEnvelope::decode(payload)?;
    let inner = envelope
        .dps
        .get(DPS_REQUEST_KEY)
        .ok_or_else(|| EnvelopeError::Malformed("missing request key".into()))?;

    match inner {
        Value::String(text) => {
            serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))
        }
        other => serde_json::from_value(other.clone())
            .map_err(|e| EnvelopeError::Malformed(e.to_string())),
    }
}

/// A fake device answering requests on a loopback pair.
///
/// The handler decides the reply to each request; `None` means stay silent.
pub struct SimulatedDevice<H> {
    device: LoopbackDevice,
    local_key: Vec<u8>,
    session: DeviceSession,
    codec: SessionCodec,
    handler: H,
}

impl<H> SimulatedDevice<H>
where
    H: Fn(&CommandRequest) -> Option<RpcOutcome> + Send + Sync + 'static,
{
    pub fn new(device: LoopbackDevice, local_key: &str, handler: H) -> Self {
        Self {
            device,
            local_key: local_key.as_bytes().to_vec(),
            session: DeviceSession::new("simulated-device"),
            codec: SessionCodec::new(false),
            handler,
        }
    }

    /// Expect and produce length-prefixed frames
    pub fn length_prefixed(mut self, enabled: bool) -> Self {
        self.codec = SessionCodec::new(enabled);
        self
    }

    /// Serve requests until the client side goes away
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some((device_id, frame)) = self.device.recv().await {
                if let Err(e) = self.answer(&device_id, &frame).await {
                    warn!("Simulated device {} dropped a request: {}", device_id, e);
                }
            }
            debug!("Simulated device stopped");
        })
    }

    async fn answer(&self, device_id: &str, frame: &[u8]) -> Result<(), SimulationError> {
        let decoded = self
            .codec
            .decode(frame, &self.local_key)
            .map_err(|e| SimulationError(e.to_string()))?;

        if decoded.protocol() != PROTOCOL_RPC_REQUEST {
            return Ok(());
        }
        let Some(payload) = decoded.payload else {
            return Ok(());
        };

        let request = parse_request(&payload).map_err(|e| SimulationError(e.to_string()))?;
        let Some(outcome) = (self.handler)(&request) else {
            debug!("Simulated device {} ignores {}", device_id, request.method);
            return Ok(());
        };

        let timestamp = decoded.header.timestamp;
        let reply = wrap_response(request.id, &outcome, timestamp)
            .map_err(|e| SimulationError(e.to_string()))?;
        let reply = self
            .codec
            .encode(&self.session, PROTOCOL_RPC_RESPONSE, timestamp, &self.local_key, &reply)
            .map_err(|e| SimulationError(e.to_string()))?;

        self.device
            .deliver(device_id, reply)
            .await
            .map_err(|e| SimulationError(e.to_string()))
    }
}

#[derive(Error, Debug)]
#[error("{0}")]
struct SimulationError(String);
