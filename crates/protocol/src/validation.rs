//! Frame validation utilities

use rockwire_crypto::AesError;
use thiserror::Error;

/// Errors raised while encoding or decoding a wire frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    Corrupt { expected: u32, actual: u32 },

    #[error("Unsupported protocol version: {0:?}")]
    UnsupportedVersion([u8; 3]),

    #[error("Length field says {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Invalid payload padding")]
    BadPadding,

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl From<AesError> for ProtocolError {
    fn from(_: AesError) -> Self {
        ProtocolError::BadPadding
    }
}

/// The only version literal the firmware speaks
pub const PROTOCOL_VERSION: [u8; 3] = *b"1.0";

/// Maximum encrypted payload size (length field is a u16)
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Fail with `Truncated` unless at least `needed` bytes are present
pub fn require_len(data: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if data.len() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Check the 3-byte version literal
pub fn validate_version(version: [u8; 3]) -> Result<(), ProtocolError> {
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Verify the CRC32 trailer of a complete frame (trailer included)
pub fn verify_checksum(frame: &[u8]) -> Result<(), ProtocolError> {
    require_len(frame, 4)?;

    let (body, trailer) = frame.split_at(frame.len() - 4);
    let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32fast::hash(body);
    if actual != expected {
        return Err(ProtocolError::Corrupt { expected, actual });
    }
    Ok(())
}

/// Check that an encrypted payload fits the u16 length field
pub fn validate_payload_size(size: usize) -> Result<(), ProtocolError> {
    if size > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}
