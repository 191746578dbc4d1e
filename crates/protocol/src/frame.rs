//! Wire frame - the unit exchanged with a device
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! version  "1.0"   3 bytes
//! seq      u32
//! random   u32
//! ts       u32     seconds, also the key-derivation input
//! protocol u16
//! len      u16     encrypted payload length   ┐ absent in the
//! payload  [len]   AES-128-ECB(PKCS#7)        │ 17-byte header-only
//! crc32    u32     over every preceding byte  ┘ keepalive form
//! ```

use crate::validation::{
    require_len, validate_payload_size, validate_version, verify_checksum, ProtocolError,
    PROTOCOL_VERSION,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rockwire_crypto::{derive_message_key, PayloadCipher};
use tracing::trace;

/// Length of the fixed header
pub const HEADER_LEN: usize = 17;

/// Length of the header plus payload length field
const BODY_OFFSET: usize = HEADER_LEN + 2;

/// Length of the CRC32 trailer
pub const CRC_LEN: usize = 4;

/// Length of the optional stream prefix
pub const PREFIX_LEN: usize = 4;

/// Transport bookkeeping placed in every frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Session sequence number
    pub seq: u32,

    /// Session random value
    pub random: u32,

    /// Timestamp in seconds, also the key-derivation input
    pub timestamp: u32,

    /// Protocol id (101 request, 102 reply, others are pushes)
    pub protocol: u16,
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Version literal
    pub version: [u8; 3],

    /// Header fields
    pub header: FrameHeader,

    /// Decrypted payload, `None` for a header-only keepalive
    pub payload: Option<Vec<u8>>,
}

impl DecodedFrame {
    /// Frame timestamp
    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    /// Frame protocol id
    pub fn protocol(&self) -> u16 {
        self.header.protocol
    }

    /// True for the 17-byte keepalive/ack form
    pub fn is_header_only(&self) -> bool {
        self.payload.is_none()
    }
}

/// Frame codec for encoding/decoding device frames
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    prefixed: bool,
}

impl FrameCodec {
    /// Create a codec for datagram-style transports (no length prefix)
    pub fn new() -> Self {
        Self { prefixed: false }
    }

    /// Create a codec that puts a 4-byte length prefix before every frame
    pub fn prefixed() -> Self {
        Self { prefixed: true }
    }

    /// Whether this codec uses the length prefix
    pub fn is_prefixed(&self) -> bool {
        self.prefixed
    }

    /// Encrypt `plaintext` under a key derived from `header.timestamp` and
    /// pack it into a frame
    pub fn encode(
        &self,
        header: &FrameHeader,
        local_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Bytes, ProtocolError> {
        let key = derive_message_key(header.timestamp, local_key);
        let encrypted = PayloadCipher::new(&key).encrypt(plaintext);
        validate_payload_size(encrypted.len())?;

        let frame_len = BODY_OFFSET + encrypted.len() + CRC_LEN;
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + frame_len);
        if self.prefixed {
            buf.put_u32(frame_len as u32);
        }
        let start = buf.len();

        buf.put_slice(&PROTOCOL_VERSION);
        buf.put_u32(header.seq);
        buf.put_u32(header.random);
        buf.put_u32(header.timestamp);
        buf.put_u16(header.protocol);
        buf.put_u16(encrypted.len() as u16);
        buf.put_slice(&encrypted);

        // The prefix is not covered by the checksum
        let crc = crc32fast::hash(&buf[start..]);
        buf.put_u32(crc);

        trace!(
            "Encoded frame: seq={} protocol={} payload={} bytes, total={} bytes",
            header.seq,
            header.protocol,
            plaintext.len(),
            buf.len()
        );

        Ok(buf.freeze())
    }

    /// Encode a header-only keepalive frame
    pub fn encode_header_only(&self, header: &FrameHeader) -> Bytes {
        let mut buf = BytesMut::with_capacity(PREFIX_LEN + HEADER_LEN);
        if self.prefixed {
            buf.put_u32(HEADER_LEN as u32);
        }
        buf.put_slice(&PROTOCOL_VERSION);
        buf.put_u32(header.seq);
        buf.put_u32(header.random);
        buf.put_u32(header.timestamp);
        buf.put_u16(header.protocol);
        buf.freeze()
    }

    /// Validate, checksum and decrypt a frame
    pub fn decode(&self, raw: &[u8], local_key: &[u8]) -> Result<DecodedFrame, ProtocolError> {
        let frame = if self.prefixed {
            strip_prefix(raw)?
        } else {
            raw
        };

        require_len(frame, HEADER_LEN)?;

        if frame.len() == HEADER_LEN {
            let (version, header) = read_header(frame);
            validate_version(version)?;
            trace!("Decoded header-only frame: protocol={}", header.protocol);
            return Ok(DecodedFrame {
                version,
                header,
                payload: None,
            });
        }

        require_len(frame, BODY_OFFSET + CRC_LEN)?;

        // Checksum first: a flipped bit anywhere must read as corruption,
        // not as a bogus version or length.
        verify_checksum(frame)?;

        let (version, header) = read_header(frame);
        validate_version(version)?;

        let mut cursor = &frame[HEADER_LEN..];
        let payload_len = cursor.get_u16() as usize;
        let body_len = frame.len() - BODY_OFFSET - CRC_LEN;
        if payload_len > body_len {
            return Err(ProtocolError::Truncated {
                needed: BODY_OFFSET + payload_len + CRC_LEN,
                actual: frame.len(),
            });
        }
        // The trailer sits right after the declared payload
        if payload_len < body_len {
            return Err(ProtocolError::LengthMismatch {
                declared: payload_len,
                actual: body_len,
            });
        }

        let key = derive_message_key(header.timestamp, local_key);
        let payload = PayloadCipher::new(&key).decrypt(&cursor[..payload_len])?;

        trace!(
            "Decoded frame: seq={} protocol={} payload={} bytes",
            header.seq,
            header.protocol,
            payload.len()
        );

        Ok(DecodedFrame {
            version,
            header,
            payload: Some(payload),
        })
    }
}

fn strip_prefix(raw: &[u8]) -> Result<&[u8], ProtocolError> {
    require_len(raw, PREFIX_LEN)?;

    let mut cursor = raw;
    let len = cursor.get_u32() as usize;
    require_len(cursor, len)?;
    Ok(&cursor[..len])
}

fn read_header(frame: &[u8]) -> ([u8; 3], FrameHeader) {
    let mut cursor = frame;
    let mut version = [0u8; 3];
    cursor.copy_to_slice(&mut version);

    let header = FrameHeader {
        seq: cursor.get_u32(),
        random: cursor.get_u32(),
        timestamp: cursor.get_u32(),
        protocol: cursor.get_u16(),
    };
    (version, header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const LOCAL_KEY: &[u8] = b"abcdef0123456789";

    fn header() -> FrameHeader {
        FrameHeader {
            seq: 1,
            random: 4711,
            timestamp: 1680196427,
            protocol: 101,
        }
    }

    #[test]
    fn test_golden_frame() {
        let encoded = FrameCodec::new()
            .encode(&header(), LOCAL_KEY, b"{\"test\":1}")
            .unwrap();

        assert_eq!(
            hex::encode(&encoded),
            "312e3000000001000012676425c34b006500107058745d6e109dfc5bc64cdac20f72d0f5c096b9"
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();
        let decoded = codec.decode(&encoded, LOCAL_KEY).unwrap();

        assert_eq!(decoded.version, *b"1.0");
        assert_eq!(decoded.timestamp(), 1680196427);
        assert_eq!(decoded.protocol(), 101);
        assert_eq!(decoded.header.seq, 1);
        assert_eq!(decoded.header.random, 4711);
        assert_eq!(decoded.payload.as_deref(), Some(b"{\"test\":1}".as_slice()));
    }

    #[test]
    fn test_roundtrip_random_payloads() {
        let codec = FrameCodec::new();
        let mut rng = rand::thread_rng();

        for _ in 0..32 {
            let len = rng.gen_range(0..300);
            let payload: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            let hdr = FrameHeader {
                timestamp: rng.r#gen(),
                ..header()
            };

            let encoded = codec.encode(&hdr, LOCAL_KEY, &payload).unwrap();
            let decoded = codec.decode(&encoded, LOCAL_KEY).unwrap();
            assert_eq!(decoded.payload, Some(payload));
            assert_eq!(decoded.header, hdr);
        }
    }

    #[test]
    fn test_single_bit_flip_is_corrupt() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();

        for byte in 0..encoded.len() - CRC_LEN {
            for bit in 0..8 {
                let mut tampered = encoded.to_vec();
                tampered[byte] ^= 1 << bit;

                let result = codec.decode(&tampered, LOCAL_KEY);
                assert!(
                    matches!(result, Err(ProtocolError::Corrupt { .. })),
                    "byte {byte} bit {bit}: {result:?}"
                );
            }
        }
    }

    #[test]
    fn test_header_only_frame() {
        let codec = FrameCodec::new();
        let encoded = codec.encode_header_only(&header());
        assert_eq!(encoded.len(), HEADER_LEN);

        let decoded = codec.decode(&encoded, LOCAL_KEY).unwrap();
        assert!(decoded.is_header_only());
        assert_eq!(decoded.timestamp(), 1680196427);
        assert_eq!(decoded.protocol(), 101);
    }

    #[test]
    fn test_truncated() {
        let codec = FrameCodec::new();
        assert!(matches!(
            codec.decode(b"1.0", LOCAL_KEY),
            Err(ProtocolError::Truncated { needed: 17, actual: 3 })
        ));

        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();
        assert!(matches!(
            codec.decode(&encoded[..20], LOCAL_KEY),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_bytes_between_payload_and_checksum() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();

        let mut frame = encoded[..encoded.len() - CRC_LEN].to_vec();
        frame.extend_from_slice(b"GARBAGE!");
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());

        assert_eq!(
            codec.decode(&frame, LOCAL_KEY),
            Err(ProtocolError::LengthMismatch {
                declared: 16,
                actual: 24
            })
        );
    }

    #[test]
    fn test_unsupported_version() {
        let codec = FrameCodec::new();
        let mut frame = codec.encode(&header(), LOCAL_KEY, b"{}").unwrap().to_vec();
        frame[..3].copy_from_slice(b"A01");
        let crc_at = frame.len() - CRC_LEN;
        let crc = crc32fast::hash(&frame[..crc_at]);
        frame[crc_at..].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(
            codec.decode(&frame, LOCAL_KEY),
            Err(ProtocolError::UnsupportedVersion(*b"A01"))
        );

        let mut keepalive = codec.encode_header_only(&header()).to_vec();
        keepalive[0] = b'2';
        assert!(matches!(
            codec.decode(&keepalive, LOCAL_KEY),
            Err(ProtocolError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_wrong_key_is_bad_padding_or_garbage() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();

        match codec.decode(&encoded, b"0000000000000000") {
            Err(err) => assert_eq!(err, ProtocolError::BadPadding),
            Ok(frame) => assert_ne!(frame.payload.as_deref(), Some(b"{\"test\":1}".as_slice())),
        }
    }

    #[test]
    fn test_prefixed_roundtrip() {
        let codec = FrameCodec::prefixed();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{\"test\":1}").unwrap();

        let prefix = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(prefix as usize, encoded.len() - PREFIX_LEN);

        // Checksum is identical to the unprefixed frame
        let plain = FrameCodec::new()
            .encode(&header(), LOCAL_KEY, b"{\"test\":1}")
            .unwrap();
        assert_eq!(&encoded[PREFIX_LEN..], &plain[..]);

        let decoded = codec.decode(&encoded, LOCAL_KEY).unwrap();
        assert_eq!(decoded.payload.as_deref(), Some(b"{\"test\":1}".as_slice()));
    }

    #[test]
    fn test_prefixed_truncated() {
        let codec = FrameCodec::prefixed();
        let encoded = codec.encode(&header(), LOCAL_KEY, b"{}").unwrap();

        assert!(matches!(
            codec.decode(&encoded[..encoded.len() - 1], LOCAL_KEY),
            Err(ProtocolError::Truncated { .. })
        ));
    }
}
