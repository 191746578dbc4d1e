//! Key and identifier derivation
//!
//! All digests here are MD5 because the firmware and cloud compute them that
//! way. None of them is relied upon for collision resistance.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use rand::RngCore;

/// Vendor salt appended to every per-message key derivation
pub const SALT: &str = "TXdfu$jyZ#TZHsg4";

/// Digit order applied to the 8 hex digits of a frame timestamp.
///
/// Vendor obfuscation. It must be reproduced exactly or the device derives a
/// different key and drops the frame.
pub const TIMESTAMP_PERMUTATION: [usize; 8] = [5, 6, 3, 7, 1, 2, 0, 4];

/// Render a timestamp as 8 lowercase hex digits and shuffle them
pub fn encode_timestamp(timestamp: u32) -> String {
    let digits = format!("{timestamp:08x}").into_bytes();
    TIMESTAMP_PERMUTATION
        .iter()
        .map(|&idx| digits[idx] as char)
        .collect()
}

/// Derive the AES key for a single frame
///
/// `md5(encode_timestamp(timestamp) ++ local_key ++ salt)`
pub fn derive_key(timestamp: u32, local_key: &[u8], salt: &[u8]) -> [u8; 16] {
    let mut ctx = md5::Context::new();
    ctx.consume(encode_timestamp(timestamp).as_bytes());
    ctx.consume(local_key);
    ctx.consume(salt);
    ctx.compute().0
}

/// Derive the AES key using the vendor salt
pub fn derive_message_key(timestamp: u32, local_key: &[u8]) -> [u8; 16] {
    derive_key(timestamp, local_key, SALT.as_bytes())
}

/// Derive the session endpoint identifier: `base64(md5(seed)[8..14])`
pub fn derive_endpoint(seed: &str) -> String {
    let digest = md5::compute(seed.as_bytes());
    STANDARD.encode(&digest.0[8..14])
}

/// Compute the `header_clientid` value: `base64(md5(username ++ installation_id))`
pub fn client_id_header(username: &str, installation_id: &str) -> String {
    let mut ctx = md5::Context::new();
    ctx.consume(username.as_bytes());
    ctx.consume(installation_id.as_bytes());
    STANDARD.encode(ctx.compute().0)
}

/// Lowercase hex MD5 of a string
pub fn md5_hex(message: &str) -> String {
    format!("{:x}", md5::compute(message.as_bytes()))
}

/// Generate a 16-byte session nonce
pub fn generate_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a URL-safe random token from `len` random bytes
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
