//! Device client - sends commands and correlates replies
//!
//! Replies are matched to outstanding commands by the request id inside the
//! decrypted payload. Frame sequence numbers and arrival order play no part
//! in correlation. A reply whose id is not outstanding, and any frame with a
//! non-reply protocol id, is a push notification and goes to the broadcast
//! stream instead.

use crate::frame_codec::{CodecError, SessionCodec};
use crate::session::DeviceSession;
use crate::{CommandSender, InboundEvent, SharedTransport};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rockwire_protocol::{
    CommandBuilder, DpsEnvelope, EnvelopeError, ParseError, ProtocolError,
    RoborockCommand, RpcOutcome, PROTOCOL_RPC_RESPONSE,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Command errors
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Device error {code}: {message}")]
    DeviceError { code: i64, message: String },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<CodecError> for CommandError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Protocol(e) => CommandError::Protocol(e),
            CodecError::Envelope(e) => CommandError::Envelope(e),
        }
    }
}

/// Lifecycle of one in-flight command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Built,
    Encrypted,
    Sent,
    WaitingResponse,
    Completed,
    TimedOut,
    Failed,
}

/// A frame that was not a reply to an outstanding command
#[derive(Debug, Clone)]
pub struct Notification {
    pub device_id: String,
    pub protocol: u16,
    pub timestamp: u32,
    /// Decrypted payload bytes
    pub payload: Bytes,
    /// Parsed envelope, when the payload is one
    pub envelope: Option<DpsEnvelope>,
}

/// Configuration for a device client
#[derive(Debug, Clone)]
pub struct DeviceClientConfig {
    /// Device id -> local key
    pub local_keys: HashMap<String, String>,

    /// Seed hashed into the session endpoint
    pub endpoint_seed: String,

    /// How long a command waits for its reply
    pub command_timeout: Duration,

    /// Put a 4-byte length prefix before every frame
    pub length_prefixed: bool,

    /// Capacity of the notification broadcast channel
    pub notification_capacity: usize,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            local_keys: HashMap::new(),
            endpoint_seed: "rockwire".to_string(),
            command_timeout: Duration::from_secs(4),
            length_prefixed: false,
            notification_capacity: 64,
        }
    }
}

struct PendingCommand {
    device_id: String,
    method: RoborockCommand,
    state: CommandState,
    tx: oneshot::Sender<Result<Value, CommandError>>,
}

/// Removes the pending entry if the waiting future is dropped early
struct PendingGuard<'a> {
    pending: &'a DashMap<u32, PendingCommand>,
    id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Client for one set of devices sharing one session
pub struct DeviceClient {
    local_keys: HashMap<String, Vec<u8>>,
    session: DeviceSession,
    builder: CommandBuilder,
    codec: SessionCodec,
    command_timeout: Duration,
    transport: SharedTransport,
    pending: DashMap<u32, PendingCommand>,
    notifications: broadcast::Sender<Notification>,
}

impl DeviceClient {
    /// Create a new device client
    pub fn new(config: DeviceClientConfig, transport: SharedTransport) -> Self {
        Self::with_session(config, transport, None)
    }

    /// Create a client with a fixed session nonce
    pub fn with_nonce(config: DeviceClientConfig, transport: SharedTransport, nonce: [u8; 16]) -> Self {
        Self::with_session(config, transport, Some(nonce))
    }

    fn with_session(
        config: DeviceClientConfig,
        transport: SharedTransport,
        nonce: Option<[u8; 16]>,
    ) -> Self {
        let session = match nonce {
            Some(nonce) => DeviceSession::with_nonce(&config.endpoint_seed, nonce),
            None => DeviceSession::new(&config.endpoint_seed),
        };
        let builder = CommandBuilder::new(session.endpoint(), session.nonce());
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        let local_keys = config
            .local_keys
            .into_iter()
            .map(|(id, key)| (id, key.into_bytes()))
            .collect::<HashMap<_, _>>();

        info!(
            "Device client ready for {} device(s), timeout {:?}",
            local_keys.len(),
            config.command_timeout
        );

        Self {
            local_keys,
            session,
            builder,
            codec: SessionCodec::new(config.length_prefixed),
            command_timeout: config.command_timeout,
            transport,
            pending: DashMap::new(),
            notifications,
        }
    }

    /// Session owned by this client
    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    /// Subscribe to push notifications
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Number of commands still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// State of an outstanding command
    pub fn command_state(&self, request_id: u32) -> Option<CommandState> {
        self.pending.get(&request_id).map(|entry| entry.state)
    }

    fn local_key(&self, device_id: &str) -> Result<&[u8], CommandError> {
        self.local_keys
            .get(device_id)
            .map(Vec::as_slice)
            .ok_or_else(|| CommandError::UnknownDevice(device_id.to_string()))
    }

    /// Send a command and wait for its reply
    pub async fn send_command(
        &self,
        device_id: &str,
        method: RoborockCommand,
        params: Vec<Value>,
    ) -> Result<Value, CommandError> {
        let local_key = self.local_key(device_id)?;

        let request = self.builder.build(method, params);
        let id = request.id;
        trace!("Command {} {}: {:?}", id, method, CommandState::Built);

        let frame = self
            .codec
            .encode_request(&self.session, local_key, &request, unix_timestamp())?;
        trace!("Command {} {}: {:?}", id, method, CommandState::Encrypted);

        // Register before sending so a fast reply cannot race past us
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCommand {
                device_id: device_id.to_string(),
                method,
                state: CommandState::Encrypted,
                tx,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        if let Err(e) = self.transport.send(device_id, frame).await {
            warn!("Command {} {} to {}: send failed: {}", id, method, device_id, e);
            trace!("Command {} {}: {:?}", id, method, CommandState::Failed);
            return Err(CommandError::Disconnected);
        }
        self.set_state(id, CommandState::Sent);
        self.set_state(id, CommandState::WaitingResponse);

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without an answer
            Ok(Err(_)) => Err(CommandError::Disconnected),
            Err(_) => {
                warn!(
                    "Command {} {} to {} timed out after {:?}",
                    id, method, device_id, self.command_timeout
                );
                trace!("Command {} {}: {:?}", id, method, CommandState::TimedOut);
                Err(CommandError::Timeout(self.command_timeout))
            }
        }
    }

    fn set_state(&self, id: u32, state: CommandState) {
        if let Some(mut entry) = self.pending.get_mut(&id) {
            trace!("Command {} {}: {:?} -> {:?}", id, entry.method, entry.state, state);
            entry.state = state;
        }
    }

    fn resolve(&self, id: u32, result: Result<Value, CommandError>) {
        if let Some((_, entry)) = self.pending.remove(&id) {
            let state = if result.is_ok() {
                CommandState::Completed
            } else {
                CommandState::Failed
            };
            trace!("Command {} {}: {:?} -> {:?}", id, entry.method, entry.state, state);
            let _ = entry.tx.send(result);
        }
    }

    /// Process one raw frame received from `device_id`.
    ///
    /// Protocol errors are returned to the caller; they mean a key mismatch
    /// or transport corruption and are never dropped silently.
    pub fn handle_frame(&self, device_id: &str, raw: &[u8]) -> Result<(), CommandError> {
        let local_key = self.local_key(device_id)?;
        let frame = self.codec.decode(raw, local_key)?;

        let Some(payload) = frame.payload else {
            trace!("Keepalive from {} (protocol {})", device_id, frame.header.protocol);
            return Ok(());
        };

        let envelope = DpsEnvelope::decode(&payload).ok();

        if frame.header.protocol == PROTOCOL_RPC_RESPONSE {
            if let Some(envelope) = &envelope {
                match envelope.rpc_response() {
                    Ok(Some(response)) => {
                        let matched = self
                            .pending
                            .get(&response.id)
                            .is_some_and(|entry| entry.device_id == device_id);
                        if matched {
                            debug!("Reply for command {} from {}", response.id, device_id);
                            let result = match response.outcome {
                                RpcOutcome::Result(value) => Ok(value),
                                RpcOutcome::Error { code, message } => {
                                    Err(CommandError::DeviceError { code, message })
                                }
                            };
                            self.resolve(response.id, result);
                            return Ok(());
                        }
                        debug!(
                            "Unmatched reply id {} from {}, treating as notification",
                            response.id, device_id
                        );
                    }
                    Ok(None) => {}
                    Err(e) => debug!("Unparseable reply from {}: {}", device_id, e),
                }
            }
        }

        self.publish(Notification {
            device_id: device_id.to_string(),
            protocol: frame.header.protocol,
            timestamp: frame.header.timestamp,
            payload: Bytes::from(payload),
            envelope,
        });
        Ok(())
    }

    fn publish(&self, notification: Notification) {
        debug!(
            "Notification from {} (protocol {})",
            notification.device_id, notification.protocol
        );
        // No subscribers is fine
        let _ = self.notifications.send(notification);
    }

    /// Fail every outstanding command for `device_id` with `Disconnected`
    pub fn handle_disconnect(&self, device_id: &str) {
        let ids: Vec<u32> = self
            .pending
            .iter()
            .filter(|entry| entry.device_id == device_id)
            .map(|entry| *entry.key())
            .collect();

        if !ids.is_empty() {
            warn!(
                "Device {} disconnected with {} command(s) outstanding",
                device_id,
                ids.len()
            );
        }
        for id in ids {
            self.resolve(id, Err(CommandError::Disconnected));
        }
    }

    /// Feed inbound transport events into this client until the channel closes
    pub fn spawn_inbound(self: &Arc<Self>, mut inbound: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    InboundEvent::Frame { device_id, data } => {
                        if let Err(e) = client.handle_frame(&device_id, &data) {
                            warn!("Dropping frame from {}: {}", device_id, e);
                        }
                    }
                    InboundEvent::Closed { device_id } => client.handle_disconnect(&device_id),
                }
            }
            debug!("Inbound channel closed");
        })
    }
}

#[async_trait]
impl CommandSender for DeviceClient {
    async fn send_command(
        &self,
        device_id: &str,
        method: RoborockCommand,
        params: Vec<Value>,
    ) -> Result<Value, CommandError> {
        DeviceClient::send_command(self, device_id, method, params).await
    }
}

fn unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as u32
}
