//! Command envelopes
//!
//! A request is a JSON-RPC-like object that travels *as a string* under one
//! numeric DPS key inside an outer timestamped object:
//!
//! ```text
//! {"t":1680196427,"dps":{"101":"{\"id\":10000,\"method\":\"get_status\",...}"}}
//! ```
//!
//! Replies use the same shape with key `"102"`.

use crate::registry::RoborockCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// First request id handed out by a fresh builder
pub const REQUEST_ID_START: u32 = 10000;

/// Frame protocol id of an RPC request
pub const PROTOCOL_RPC_REQUEST: u16 = 101;

/// Frame protocol id of an RPC reply
pub const PROTOCOL_RPC_RESPONSE: u16 = 102;

/// DPS key carrying an RPC request
pub const DPS_REQUEST_KEY: &str = "101";

/// DPS key carrying an RPC reply
pub const DPS_RESPONSE_KEY: &str = "102";

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Envelope serialization failed: {0}")]
    Serialize(String),

    #[error("Malformed envelope: {0}")]
    Malformed(String),
}

/// Security block attached to every request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SecurityBlock {
    /// Session endpoint identifier
    pub endpoint: String,

    /// Session nonce, upper-case hex
    pub nonce: String,
}

/// The inner RPC request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub id: u32,
    pub method: String,
    pub params: Vec<Value>,
    pub security: SecurityBlock,
}

/// Outer timestamped object holding DPS values
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DpsEnvelope {
    pub t: u32,
    pub dps: BTreeMap<String, Value>,
}

impl DpsEnvelope {
    /// Parse a decrypted frame payload
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(payload).map_err(|e| EnvelopeError::Malformed(e.to_string()))
    }

    /// Extract the RPC reply carried under the reply key, if any
    pub fn rpc_response(&self) -> Result<Option<RpcResponse>, EnvelopeError> {
        let Some(raw) = self.dps.get(DPS_RESPONSE_KEY) else {
            return Ok(None);
        };

        // The reply is normally a JSON string; some firmware inlines the object
        let value = match raw {
            Value::String(text) => serde_json::from_str::<Value>(text)
                .map_err(|e| EnvelopeError::Malformed(e.to_string()))?,
            other => other.clone(),
        };

        RpcResponse::from_value(value).map(Some)
    }
}

/// Outcome of an RPC reply
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    Result(Value),
    Error { code: i64, message: String },
}

/// A correlated RPC reply
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u32,
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    /// Interpret a reply object `{"id":N,"result":...}` or `{"id":N,"error":{...}}`
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut object) = value else {
            return Err(EnvelopeError::Malformed("reply is not an object".into()));
        };

        let id = object
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| EnvelopeError::Malformed("reply has no request id".into()))?;

        if let Some(error) = object.remove("error") {
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .ok_or_else(|| EnvelopeError::Malformed("error reply has no code".into()))?;
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| error.to_string());
            return Ok(Self {
                id,
                outcome: RpcOutcome::Error { code, message },
            });
        }

        let result = match object.remove("result") {
            // Most getters answer with a one-element list
            Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
            Some(other) => other,
            None => Value::Null,
        };

        Ok(Self {
            id,
            outcome: RpcOutcome::Result(result),
        })
    }
}

/// Builds request envelopes for one client session
pub struct CommandBuilder {
    next_id: AtomicU32,
    security: SecurityBlock,
}

impl CommandBuilder {
    /// Create a builder bound to a session's endpoint and nonce
    pub fn new(endpoint: impl Into<String>, nonce: &[u8; 16]) -> Self {
        Self {
            next_id: AtomicU32::new(REQUEST_ID_START),
            security: SecurityBlock {
                endpoint: endpoint.into(),
                nonce: hex::encode_upper(nonce),
            },
        }
    }

    /// Hand out the next request id
    pub fn next_request_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Security block shared by every request of the session
    pub fn security(&self) -> &SecurityBlock {
        &self.security
    }

    /// Build the inner request object with a fresh id
    pub fn build(&self, method: RoborockCommand, params: Vec<Value>) -> CommandRequest {
        CommandRequest {
            id: self.next_request_id(),
            method: method.as_str().to_string(),
            params,
            security: self.security.clone(),
        }
    }

    /// Serialize `inner` into the DPS envelope handed to the cipher
    pub fn wrap(inner: &CommandRequest, timestamp: u32) -> Result<Vec<u8>, EnvelopeError> {
        let inner = serde_json::to_string(inner).map_err(|e| EnvelopeError::Serialize(e.to_string()))?;

        let mut dps = BTreeMap::new();
        dps.insert(DPS_REQUEST_KEY.to_string(), Value::String(inner));

        serde_json::to_vec(&DpsEnvelope { t: timestamp, dps })
            .map_err(|e| EnvelopeError::Serialize(e.to_string()))
    }
}

/// Build the reply envelope a device would send for `id`
pub fn wrap_response(id: u32, outcome: &RpcOutcome, timestamp: u32) -> Result<Vec<u8>, EnvelopeError> {
    let inner = match outcome {
        RpcOutcome::Result(result) => serde_json::json!({ "id": id, "result": result }),
        RpcOutcome::Error { code, message } => {
            serde_json::json!({ "id": id, "error": { "code": code, "message": message } })
        }
    };

    let mut dps = BTreeMap::new();
    dps.insert(DPS_RESPONSE_KEY.to_string(), Value::String(inner.to_string()));

    serde_json::to_vec(&DpsEnvelope { t: timestamp, dps })
        .map_err(|e| EnvelopeError::Serialize(e.to_string()))
}
