//! Session-aware frame codec
//!
//! Glues the command envelope, the session header and the wire codec together.

use crate::session::DeviceSession;
use bytes::Bytes;
use rockwire_protocol::{
    CommandBuilder, CommandRequest, DecodedFrame, EnvelopeError, FrameCodec, ProtocolError,
    PROTOCOL_RPC_REQUEST,
};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Frame codec bound to the wire options of one client
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionCodec {
    codec: FrameCodec,
}

impl SessionCodec {
    /// Create a codec, optionally with the 4-byte stream length prefix
    pub fn new(length_prefixed: bool) -> Self {
        let codec = if length_prefixed {
            FrameCodec::prefixed()
        } else {
            FrameCodec::new()
        };
        Self { codec }
    }

    /// Encode `plaintext` with the next header of `session`
    pub fn encode(
        &self,
        session: &DeviceSession,
        protocol: u16,
        timestamp: u32,
        local_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Bytes, ProtocolError> {
        let header = session.next_header(timestamp, protocol);
        self.codec.encode(&header, local_key, plaintext)
    }

    /// Wrap a command request in its DPS envelope and frame it
    pub fn encode_request(
        &self,
        session: &DeviceSession,
        local_key: &[u8],
        request: &CommandRequest,
        timestamp: u32,
    ) -> Result<Bytes, CodecError> {
        let plaintext = CommandBuilder::wrap(request, timestamp)?;
        trace!(
            "Wrapped request {} ({}): {} bytes",
            request.id,
            request.method,
            plaintext.len()
        );

        let frame = self.encode(session, PROTOCOL_RPC_REQUEST, timestamp, local_key, &plaintext)?;
        trace!("Framed request {}: {} bytes", request.id, frame.len());
        Ok(frame)
    }

    /// Decode a received frame
    pub fn decode(&self, raw: &[u8], local_key: &[u8]) -> Result<DecodedFrame, ProtocolError> {
        self.codec.decode(raw, local_key)
    }
}
