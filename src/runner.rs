//! The fixed smoke sequence.
//!
//! Drives `initialize` → `notifications/initialized` → `tools/list` →
//! `tools/call` against a freshly spawned server, validating the structural
//! shape of each response.  Every step is a prerequisite for the next, so any
//! timeout or shape mismatch is fatal for the run.
//!
//! The server process is acquired at spawn and released unconditionally:
//! [`run_smoke`] calls [`ServerHandle::shutdown`] on every path out of the
//! sequence, with `kill_on_drop` covering anything that unwinds past it.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::info;

use crate::correlate::{self, DiagnosticBuffer};
use crate::driver::{self, ServerHandle};
use crate::message::{self, RpcResponse};
use crate::mux::StreamMux;
use crate::{AppError, Result};

/// Default timeout for the `initialize` and `tools/list` steps.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the `tools/call` step, which may do real work.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for one smoke run.
#[derive(Debug, Clone)]
pub struct SmokeConfig {
    /// Server executable name, resolved on `PATH` (or a direct path).
    pub server_bin: String,
    /// Working directory for the server process — the project root to index.
    pub workspace_root: PathBuf,
    /// Tool invoked by the sample call.
    pub tool: String,
    /// Symbol name passed as the tool's `name` argument.
    pub target: String,
    /// `membersLimit` argument for the sample call.
    pub members_limit: u64,
    /// Timeout for the `initialize` and `tools/list` steps.
    pub handshake_timeout: Duration,
    /// Timeout for the `tools/call` step.
    pub call_timeout: Duration,
}

impl SmokeConfig {
    /// Config with the stock `aiq-mcp` defaults for the given workspace.
    #[must_use]
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            server_bin: "aiq-mcp".to_owned(),
            workspace_root,
            tool: "query_type".to_owned(),
            target: "Bezier3Segment".to_owned(),
            members_limit: 1,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            call_timeout: CALL_TIMEOUT,
        }
    }
}

/// What a successful run observed, for reporting.
#[derive(Debug, Clone)]
pub struct SmokeSummary {
    /// The `serverInfo` object from the `initialize` response.
    pub server_info: Value,
    /// The negotiated protocol version string.
    pub protocol_version: String,
    /// Names of the tools the server advertised.
    pub tool_names: Vec<String>,
    /// The `isError` flag of the sample call's result.
    pub is_error: bool,
    /// First text content item of the sample call, newline-flattened and
    /// capped at 200 characters.
    pub preview: String,
}

/// Run the full smoke sequence against a freshly spawned server.
///
/// Validates the workspace, resolves and spawns the server binary, drives
/// the four-step sequence, and tears the process down on every path.
/// Diagnostic (stderr) lines observed during the run accumulate in
/// `diagnostics`, which the caller owns so it can surface the tail on
/// failure.
///
/// # Errors
///
/// - [`AppError::Setup`] — workspace is not a directory, or the server
///   binary cannot be found (no process is spawned).
/// - [`AppError::Spawn`] — the process could not be started.
/// - [`AppError::Timeout`] — a step's response did not arrive in time.
/// - [`AppError::Shape`] — a response was missing a required field.
/// - [`AppError::Io`] / [`AppError::Codec`] — pipe or framing failures.
pub async fn run_smoke(
    config: &SmokeConfig,
    diagnostics: &mut DiagnosticBuffer,
) -> Result<SmokeSummary> {
    let workspace = config.workspace_root.canonicalize().map_err(|err| {
        AppError::Setup(format!(
            "not a directory: {}: {err}",
            config.workspace_root.display()
        ))
    })?;
    if !workspace.is_dir() {
        return Err(AppError::Setup(format!(
            "not a directory: {}",
            workspace.display()
        )));
    }

    let bin = driver::resolve_server_bin(&config.server_bin)?;
    let mut handle = driver::spawn(&bin, &workspace)?;
    let (stdout, stderr) = handle.take_output()?;
    let mut mux = StreamMux::new(stdout, stderr);

    // The process is released on every path out of the sequence.
    let result = drive_sequence(config, &mut handle, &mut mux, diagnostics).await;
    handle.shutdown().await;

    result
}

// ── Sequence steps ────────────────────────────────────────────────────────────

/// Issue the four protocol steps in order and validate each response shape.
async fn drive_sequence(
    config: &SmokeConfig,
    handle: &mut ServerHandle,
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
) -> Result<SmokeSummary> {
    let (server_info, protocol_version) =
        step_initialize(config, handle, mux, diagnostics).await?;

    // initialized notification — no response is ever awaited.
    let note = message::notification("notifications/initialized");
    handle.write_line(&message::encode_line(&note)?).await?;

    let tool_names = step_tools_list(config, handle, mux, diagnostics).await?;
    let (is_error, preview) = step_tools_call(config, handle, mux, diagnostics).await?;

    Ok(SmokeSummary {
        server_info,
        protocol_version,
        tool_names,
        is_error,
        preview,
    })
}

/// Step 1: `initialize` — params must exist and not be null.
async fn step_initialize(
    config: &SmokeConfig,
    handle: &mut ServerHandle,
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
) -> Result<(Value, String)> {
    let response = call(
        handle,
        mux,
        diagnostics,
        1,
        "initialize",
        Some(json!({})),
        config.handshake_timeout,
    )
    .await?;
    let result = expect_result(&response, "initialize")?;

    let server_info = result
        .get("serverInfo")
        .filter(|v| v.is_object())
        .cloned()
        .ok_or_else(|| {
            AppError::Shape(format!("initialize result missing serverInfo object: {result}"))
        })?;
    let protocol_version = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            AppError::Shape(format!("initialize result missing protocolVersion: {result}"))
        })?
        .to_owned();

    info!(protocol = %protocol_version, "initialize complete");
    println!("initialize.ok server={server_info} protocol={protocol_version}");

    Ok((server_info, protocol_version))
}

/// Step 3: `tools/list` — no params; every descriptor must expose a name.
async fn step_tools_list(
    config: &SmokeConfig,
    handle: &mut ServerHandle,
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
) -> Result<Vec<String>> {
    let response = call(
        handle,
        mux,
        diagnostics,
        2,
        "tools/list",
        None,
        config.handshake_timeout,
    )
    .await?;
    let result = expect_result(&response, "tools/list")?;

    let tools = result.get("tools").and_then(Value::as_array).ok_or_else(|| {
        AppError::Shape(format!("tools/list result missing tools array: {result}"))
    })?;
    let mut tool_names = Vec::with_capacity(tools.len());
    for tool in tools {
        let name = tool.get("name").and_then(Value::as_str).ok_or_else(|| {
            AppError::Shape(format!("tool descriptor missing name: {tool}"))
        })?;
        tool_names.push(name.to_owned());
    }

    info!(count = tool_names.len(), "tools listed");
    println!("tools/list.ok {tool_names:?}");

    Ok(tool_names)
}

/// Step 4: `tools/call` — invoke the sample tool and extract a text preview.
async fn step_tools_call(
    config: &SmokeConfig,
    handle: &mut ServerHandle,
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
) -> Result<(bool, String)> {
    let params = json!({
        "name": config.tool,
        "arguments": {
            "name": config.target,
            "membersLimit": config.members_limit,
        },
    });
    let response = call(
        handle,
        mux,
        diagnostics,
        3,
        "tools/call",
        Some(params),
        config.call_timeout,
    )
    .await?;
    let result = expect_result(&response, "tools/call")?;

    let is_error = result.get("isError").and_then(Value::as_bool).ok_or_else(|| {
        AppError::Shape(format!("tools/call result missing isError flag: {result}"))
    })?;
    let content = result.get("content").and_then(Value::as_array).ok_or_else(|| {
        AppError::Shape(format!("tools/call result missing content array: {result}"))
    })?;

    let first_text = content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
        .find_map(|item| item.get("text").and_then(Value::as_str));
    if !is_error && first_text.is_none() {
        return Err(AppError::Shape(format!(
            "tools/call result has no text content item: {result}"
        )));
    }

    let preview: String = first_text
        .unwrap_or_default()
        .replace('\n', " ")
        .chars()
        .take(200)
        .collect();

    info!(is_error, "sample tool call complete");
    println!("tools/call.ok isError={is_error} preview={preview}");

    Ok((is_error, preview))
}

/// Encode and send one request, then await its correlated response.
async fn call(
    handle: &mut ServerHandle,
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
    id: u64,
    method: &str,
    params: Option<Value>,
    timeout: Duration,
) -> Result<RpcResponse> {
    let request = message::request(id, method, params);
    handle.write_line(&message::encode_line(&request)?).await?;
    correlate::await_response(mux, diagnostics, id, timeout).await
}

/// Require a `result` payload, treating an `error` payload as a fatal shape.
fn expect_result<'a>(response: &'a RpcResponse, step: &str) -> Result<&'a Value> {
    if let Some(error) = &response.error {
        return Err(AppError::Shape(format!("{step} returned an error: {error}")));
    }
    response
        .result
        .as_ref()
        .ok_or_else(|| AppError::Shape(format!("{step} response has neither result nor error")))
}
