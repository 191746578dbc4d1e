//! Device session state

use rockwire_crypto::{derive_endpoint, generate_nonce};
use rockwire_protocol::FrameHeader;
use std::sync::atomic::{AtomicU32, Ordering};

/// First sequence number of a session
pub const INITIAL_SEQ: u32 = 1;

/// Random value stamped into every header
pub const SESSION_RANDOM: u32 = 4711;

/// Lifetime-scoped state of one client's conversation with its devices.
///
/// The nonce and endpoint are fixed at construction and never regenerated.
pub struct DeviceSession {
    seq: AtomicU32,
    random: u32,
    nonce: [u8; 16],
    endpoint: String,
}

impl DeviceSession {
    /// Start a session with a fresh random nonce
    pub fn new(endpoint_seed: &str) -> Self {
        Self::with_nonce(endpoint_seed, generate_nonce())
    }

    /// Start a session with a known nonce
    pub fn with_nonce(endpoint_seed: &str, nonce: [u8; 16]) -> Self {
        Self {
            seq: AtomicU32::new(INITIAL_SEQ),
            random: SESSION_RANDOM,
            nonce,
            endpoint: derive_endpoint(endpoint_seed),
        }
    }

    pub fn nonce(&self) -> &[u8; 16] {
        &self.nonce
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sequence number the next frame will carry
    pub fn current_seq(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }

    /// Stamp a header for the next outgoing frame.
    ///
    /// Never rolled back, even when the command later times out.
    pub fn next_header(&self, timestamp: u32, protocol: u16) -> FrameHeader {
        FrameHeader {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            random: self.random,
            timestamp,
            protocol,
        }
    }
}
