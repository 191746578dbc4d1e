//! Rockwire Crypto - Key derivation, payload encryption and request signing
//!
//! This crate provides:
//! - Per-message AES key derivation from a frame timestamp and device secret
//! - AES-128-ECB payload encryption/decryption with PKCS#7 padding
//! - Session endpoint and cloud client-id derivation
//! - HMAC-SHA256 challenge/response signing for the regional cloud API

mod aes;
mod hmac_auth;
mod keys;

pub use aes::*;
pub use hmac_auth::*;
pub use keys::*;
