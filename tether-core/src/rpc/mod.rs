// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! JSON-RPC Model
//!
//! Request/response envelopes exchanged between peers (inside sealed
//! envelopes) and with the relay (in clear), plus the correlation ledger.

pub mod history;
pub mod method;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use history::{Emitter, HistoryError, RpcHistory, RpcRecord};
pub use method::ProtocolMethod;

/// JSON-RPC protocol version string.
pub const JSONRPC_VERSION: &str = "2.0";

static LAST_RPC_ID: AtomicU64 = AtomicU64::new(0);

/// Correlation id: millisecond timestamp scaled by 1000 plus a random suffix,
/// forced monotonic within the process so two calls never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpcId(pub u64);

impl RpcId {
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let candidate = millis * 1000 + rand::thread_rng().gen_range(0..1000);

        let mut last = LAST_RPC_ID.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match LAST_RPC_ID.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return RpcId(next),
                Err(actual) => last = actual,
            }
        }
    }
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RpcId({})", self.0)
    }
}

/// A JSON-RPC request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: RpcId,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Builds a request with a fresh id.
    pub fn new<P: Serialize>(method: &str, params: &P) -> Result<Self, serde_json::Error> {
        Ok(RpcRequest {
            id: RpcId::generate(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        })
    }

    /// Decodes `params` into a typed value.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorPayload {
    pub code: i64,
    pub message: String,
}

/// Outcome carried by a response: exactly one of `result` / `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcOutcome {
    Result(Value),
    Error(RpcErrorPayload),
}

/// A JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: RpcId,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn success<R: Serialize>(id: RpcId, result: &R) -> Result<Self, serde_json::Error> {
        Ok(RpcResponse {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: RpcOutcome::Result(serde_json::to_value(result)?),
        })
    }

    pub fn error(id: RpcId, code: i64, message: impl Into<String>) -> Self {
        RpcResponse {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            outcome: RpcOutcome::Error(RpcErrorPayload {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }
}

/// Either side of a JSON-RPC exchange, as decoded from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcPayload {
    Request(RpcRequest),
    Response(RpcResponse),
}

impl RpcPayload {
    /// Classifies a decoded JSON value: requests carry `method`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("method").is_some() {
            Ok(RpcPayload::Request(serde_json::from_value(value)?))
        } else {
            Ok(RpcPayload::Response(serde_json::from_value(value)?))
        }
    }
}

impl<'de> Deserialize<'de> for RpcPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RpcPayload::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl Serialize for RpcPayload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            RpcPayload::Request(r) => r.serialize(serializer),
            RpcPayload::Response(r) => r.serialize(serializer),
        }
    }
}
