//! HTTP transport for the node's JSON-RPC interface.
//!
//! JSON-RPC 1.0 over HTTP POST with basic auth. The node answers RPC-level
//! errors with a non-2xx status *and* a JSON error envelope, so the body is
//! parsed regardless of status; only a non-JSON body is a transport failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use super::{envelope, open_envelope, BatchEntry, RemoteLedger, RpcCall, RpcError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Request id used for single calls.
const CLIENT_ID: &str = "vlotto-buyer";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// `RemoteLedger` backed by a running node's RPC port.
pub struct HttpLedger {
    http: Client,
    url: String,
    user: String,
    password: SecretString,
    timeout: Duration,
    batch_timeout: Duration,
}

impl HttpLedger {
    pub fn new(url: &str, user: &str, password: SecretString) -> Result<Self, RpcError> {
        let http = Client::builder()
            .user_agent(concat!("vlotto-buyer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: url.to_string(),
            user: user.to_string(),
            password,
            timeout: DEFAULT_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        })
    }

    /// Override the single-call and batch timeouts.
    pub fn with_timeouts(mut self, timeout: Duration, batch_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, body: &Value, timeout: Duration) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        serde_json::from_str(&text).map_err(|_| RpcError::NonJson { status })
    }
}

#[async_trait]
impl RemoteLedger for HttpLedger {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        debug!(method, "RPC call");
        let body = self.post(&envelope(CLIENT_ID, method, &params), self.timeout).await?;
        open_envelope(body)
    }

    async fn batch_call(&self, calls: Vec<RpcCall>) -> Result<Vec<BatchEntry>, RpcError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = calls.len(), "RPC batch call");
        let payload: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(i, c)| envelope(&batch_id(i), &c.method, &c.params))
            .collect();

        let body = self.post(&Value::Array(payload), self.batch_timeout).await?;
        split_batch_response(body, calls.len())
    }
}

fn batch_id(index: usize) -> String {
    format!("batch_{index}")
}

/// Map a batch response back onto request order.
///
/// Entries are matched by their `batch_<i>` id when present, otherwise by
/// position. Requests the node did not answer come back as faults.
fn split_batch_response(body: Value, expected: usize) -> Result<Vec<BatchEntry>, RpcError> {
    let items = match body {
        Value::Array(items) => items,
        // A whole-batch rejection comes back as a single envelope.
        other => {
            open_envelope(other)?;
            return Err(RpcError::Malformed("batch response was not an array".into()));
        }
    };

    let mut slots: Vec<Option<BatchEntry>> = (0..expected).map(|_| None).collect();
    for (position, item) in items.into_iter().enumerate() {
        let index = item
            .get("id")
            .and_then(Value::as_str)
            .and_then(|id| id.strip_prefix("batch_"))
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|i| *i < expected)
            .unwrap_or(position);

        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(open_envelope(item));
        }
    }

    Ok(slots
        .into_iter()
        .map(|s| s.unwrap_or_else(|| Err(RpcError::fault("no response for batch entry"))))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_preserves_order_and_partial_failure() {
        let body = json!([
            {"id": "batch_0", "result": {"VRSC": 5.0}, "error": null},
            {"id": "batch_1", "result": null, "error": {"code": -5, "message": "Invalid address"}},
            {"id": "batch_2", "result": {}, "error": null},
        ]);
        let out = split_batch_response(body, 3).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap()["VRSC"], 5.0);
        assert_eq!(out[1].as_ref().unwrap_err().to_string(), "Invalid address");
        assert!(out[2].is_ok());
    }

    #[test]
    fn test_batch_reorders_by_id() {
        let body = json!([
            {"id": "batch_1", "result": "second", "error": null},
            {"id": "batch_0", "result": "first", "error": null},
        ]);
        let out = split_batch_response(body, 2).unwrap();
        assert_eq!(out[0].as_ref().unwrap(), "first");
        assert_eq!(out[1].as_ref().unwrap(), "second");
    }

    #[test]
    fn test_batch_missing_entry_is_fault() {
        let body = json!([{"id": "batch_0", "result": 1, "error": null}]);
        let out = split_batch_response(body, 2).unwrap();
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(RpcError::Fault { .. })));
    }

    #[test]
    fn test_batch_whole_rejection() {
        let body = json!({"result": null, "error": {"code": -32600, "message": "Invalid Request"}});
        let err = split_batch_response(body, 2).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Request");
    }

    #[test]
    fn test_new_client_keeps_url() {
        let ledger = HttpLedger::new(
            "http://127.0.0.1:27486/",
            "user",
            SecretString::new("pw".to_string()),
        )
        .unwrap();
        assert_eq!(ledger.url(), "http://127.0.0.1:27486/");
    }
}
