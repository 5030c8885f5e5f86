//! JSON-RPC 2.0 envelope builders and tolerant response decoding.
//!
//! The harness treats protocol content as opaque: requests are built as
//! [`serde_json::Value`] envelopes with the `"jsonrpc":"2.0"` marker, and
//! inbound lines are decoded only far enough to correlate by `id` and hand
//! the `result`/`error` payload to the sequence runner.  Deeper shape
//! validation belongs to the runner, not here.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppError, Result};

/// Protocol-version marker carried by every outbound envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Build a request envelope: a call with a correlation `id`.
///
/// `id` is caller-chosen; uniqueness within the session is the caller's
/// responsibility (the smoke runner uses 1, 2, 3).  `params` is attached
/// only when present — `initialize` requires an empty-but-present object,
/// while `tools/list` carries none at all.
#[must_use]
pub fn request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut msg = json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        msg["params"] = params;
    }
    msg
}

/// Build a notification envelope: fire-and-forget, no `id`, no response.
#[must_use]
pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "method": method,
    })
}

/// Serialise an envelope to one compact transport line.
///
/// The output contains no embedded line terminators — `serde_json` escapes
/// any newline inside string values — so appending `\n` at the write site
/// yields exactly one framed message.
///
/// # Errors
///
/// Returns [`AppError::Codec`] if serialisation fails (should not occur for
/// a [`Value`]).
pub fn encode_line(value: &Value) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Codec(format!("failed to serialise outbound message: {e}")))
}

/// Inbound message on the protocol stream, decoded just far enough to
/// correlate.
///
/// A message lacking an `id` (a server-side notification) or whose `id`
/// matches no outstanding request is not actionable for correlation; the
/// correlator discards it.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Correlation id; absent on notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Success payload; mutually exclusive with `error`.
    #[serde(default)]
    pub result: Option<Value>,
    /// Failure payload; mutually exclusive with `result`.
    #[serde(default)]
    pub error: Option<Value>,
}

impl RpcResponse {
    /// Whether this message answers the request with id `target`.
    #[must_use]
    pub fn matches(&self, target: u64) -> bool {
        self.id.as_ref().and_then(Value::as_u64) == Some(target)
    }
}

/// Decode one protocol-stream line into an [`RpcResponse`].
///
/// Empty lines and lines that fail to parse as a JSON object yield `None`:
/// they are noise, never fatal — a structurally invalid line on the protocol
/// stream must not abort the run.
#[must_use]
pub fn decode_response(line: &str) -> Option<RpcResponse> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
