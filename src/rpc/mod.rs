//! Remote ledger boundary.
//!
//! Defines the `RemoteLedger` trait (single and batch JSON-RPC calls against
//! the node) together with the transport-level error type. This layer is
//! pure plumbing: no retries, no interpretation of results. Typed method
//! wrappers live in `crate::node`.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single RPC round trip.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    /// Connection refused, timeout, TLS failure, unreadable body.
    #[error("RPC connection error: {0}")]
    Transport(String),

    #[error("RPC returned non-JSON response (HTTP {status})")]
    NonJson { status: u16 },

    /// Body was JSON but not a JSON-RPC envelope we understand.
    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    /// Error envelope reported by the node itself.
    #[error("{message}")]
    Fault { code: Option<i64>, message: String },
}

impl RpcError {
    /// Whether the request never produced a node-level answer.
    pub fn is_transport(&self) -> bool {
        !matches!(self, RpcError::Fault { .. })
    }

    /// Build a fault from a bare message (no error code).
    pub fn fault(message: impl Into<String>) -> Self {
        RpcError::Fault {
            code: None,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One method invocation inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }
}

/// Per-entry result of a batch call. Only `RpcError::Fault` appears here;
/// transport failures abort the whole batch instead.
pub type BatchEntry = Result<Value, RpcError>;

/// JSON-RPC 1.0 request envelope.
pub fn envelope(id: &str, method: &str, params: &[Value]) -> Value {
    serde_json::json!({
        "jsonrpc": "1.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Unwrap a `{result, error}` response envelope.
pub fn open_envelope(body: Value) -> Result<Value, RpcError> {
    let Value::Object(mut map) = body else {
        return Err(RpcError::Malformed(format!("expected object envelope, got {body}")));
    };

    match map.remove("error") {
        None | Some(Value::Null) => Ok(map.remove("result").unwrap_or(Value::Null)),
        Some(Value::Object(err)) => {
            let code = err.get("code").and_then(Value::as_i64);
            let message = match err.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => Value::Object(err.clone()).to_string(),
            };
            Err(RpcError::Fault { code, message })
        }
        Some(Value::String(s)) => Err(RpcError::fault(s)),
        Some(other) => Err(RpcError::fault(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Call boundary to the ledger node.
///
/// `batch_call` must return one entry per input call, in input order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    async fn batch_call(&self, calls: Vec<RpcCall>) -> Result<Vec<BatchEntry>, RpcError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
