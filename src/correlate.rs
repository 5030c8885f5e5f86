//! Response correlation and the diagnostic side buffer.
//!
//! [`await_response`] polls the stream mux in short slices until a protocol
//! line decodes to a response whose id matches the one awaited, or the
//! per-request deadline elapses.  Diagnostic lines observed along the way are
//! diverted into the [`DiagnosticBuffer`] instead of being discarded, so the
//! runner can surface the server's stderr tail when a run fails.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::message::{self, RpcResponse};
use crate::mux::{StreamMux, StreamTag, POLL_SLICE};
use crate::{AppError, Result};

/// Display-time cap on the number of diagnostic lines surfaced at teardown.
pub const DIAGNOSTIC_TAIL: usize = 10;

/// Ordered, append-only capture of the server's diagnostic stream.
///
/// Lives for the whole run and is never truncated; only [`tail`] applies a
/// read-on-display cap.
///
/// [`tail`]: DiagnosticBuffer::tail
#[derive(Debug, Default)]
pub struct DiagnosticBuffer {
    lines: Vec<String>,
}

impl DiagnosticBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw diagnostic line in emission order.
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    /// Number of captured lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been captured yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The most recent `n` lines, oldest first.
    #[must_use]
    pub fn tail(&self, n: usize) -> &[String] {
        &self.lines[self.lines.len().saturating_sub(n)..]
    }
}

/// Await the response matching `target_id`, bounded by `deadline`.
///
/// Loops over [`POLL_SLICE`]-bounded mux polls until the elapsed time
/// exceeds `deadline`; the total wait is therefore bounded by `deadline`
/// plus one slice.  Per batch:
///
/// - diagnostic lines are appended to `diagnostics` unconditionally,
///   regardless of correlation state;
/// - protocol lines that fail to decode are discarded as noise;
/// - decoded responses with a non-matching id are discarded — the harness
///   only ever has one outstanding request by construction, so they are
///   unexpected but must not crash the loop.
///
/// # Errors
///
/// Returns [`AppError::Timeout`] carrying `target_id` when the deadline
/// elapses without a match.
pub async fn await_response(
    mux: &mut StreamMux,
    diagnostics: &mut DiagnosticBuffer,
    target_id: u64,
    deadline: Duration,
) -> Result<RpcResponse> {
    let started = Instant::now();

    while started.elapsed() < deadline {
        let batch = mux.poll_lines(POLL_SLICE).await;

        // Consume the whole batch before returning so diagnostic lines that
        // arrived alongside the match are never dropped.
        let mut matched = None;
        for (tag, line) in batch {
            match tag {
                StreamTag::Diagnostic => diagnostics.push(line),
                StreamTag::Protocol => {
                    let Some(response) = message::decode_response(&line) else {
                        debug!(raw = %line, "skipping undecodable protocol line");
                        continue;
                    };
                    if matched.is_none() && response.matches(target_id) {
                        matched = Some(response);
                    } else {
                        debug!(
                            target_id,
                            id = ?response.id,
                            "discarding protocol message for another id"
                        );
                    }
                }
            }
        }

        if let Some(response) = matched {
            return Ok(response);
        }
    }

    Err(AppError::Timeout {
        id: target_id,
        waited: started.elapsed(),
    })
}
