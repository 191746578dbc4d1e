//! Rockwire Cloud - Account login and home metadata
//!
//! This crate provides:
//! - `CloudAuthClient`: region lookup, password/code login, home data retrieval
//! - `HttpExecutor`: the seam between the client and the HTTP stack
//! - `UserData` / `HomeData`: typed login and home payloads

mod client;
mod http;
mod models;

pub use client::*;
pub use http::*;
pub use models::*;

use thiserror::Error;

/// Cloud authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Server rejected request: {0}")]
    ServerRejected(String),

    #[error("Region resolution failed: {0}")]
    RegionResolutionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}
