//! HMAC-SHA256 challenge/response signing for the regional cloud API
//!
//! The regional API does not accept the login bearer token. Each request
//! instead carries an `Authorization: Hawk ...` header whose `mac` is an
//! HMAC over a colon-joined "prestr". The prestr has exactly seven fields,
//! the last two always empty, and the server rejects anything else.

use crate::keys::md5_hex;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Scheme literal used in the Authorization header
pub const SIGNING_SCHEME: &str = "Hawk";

/// Result of signing one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// The exact string that was MACed
    pub prestr: String,

    /// base64(HMAC-SHA256(secret, prestr))
    pub mac: String,

    /// Complete Authorization header value
    pub authorization: String,
}

/// HMAC-SHA256 signer holding the regional credential bundle
pub struct HmacAuthenticator {
    user: String,
    password: String,
    secret: Vec<u8>,
}

impl HmacAuthenticator {
    /// Create a signer from the regional `user`, `password` and shared secret
    pub fn new(user: impl Into<String>, password: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Build the prestr: `user:password:nonce:timestamp:md5hex(path)::`
    pub fn prestr(&self, nonce: &str, timestamp: u64, path: &str) -> String {
        let timestamp = timestamp.to_string();
        let path_hash = md5_hex(path);
        [
            self.user.as_str(),
            self.password.as_str(),
            nonce,
            timestamp.as_str(),
            path_hash.as_str(),
            "",
            "",
        ]
        .join(":")
    }

    /// Compute base64 HMAC-SHA256 for the given data
    pub fn compute(&self, data: &[u8]) -> String {
        // HMAC accepts keys of any length, so construction cannot fail
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(data);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Sign a request path
    pub fn sign(&self, nonce: &str, timestamp: u64, path: &str) -> SignedRequest {
        let prestr = self.prestr(nonce, timestamp, path);
        let mac = self.compute(prestr.as_bytes());
        let authorization = format!(
            "{SIGNING_SCHEME} id=\"{}\", s=\"{}\", ts=\"{}\", nonce=\"{}\", mac=\"{}\"",
            self.user, self.password, timestamp, nonce, mac
        );

        SignedRequest {
            prestr,
            mac,
            authorization,
        }
    }
}
