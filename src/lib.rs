#![forbid(unsafe_code)]

//! `aiq-smoke` — smoke-test harness for the `aiq-mcp` stdio server.
//!
//! Spawns the server process, speaks line-delimited JSON-RPC 2.0 over its
//! stdin/stdout pipes, and verifies the minimal protocol sequence
//! (`initialize`, `notifications/initialized`, `tools/list`, one
//! `tools/call`) before tearing the process down.
//!
//! Module map:
//! - [`codec`]: line framing with a bounded max line length.
//! - [`message`]: JSON-RPC envelope builders and tolerant response decoding.
//! - [`driver`]: child-process lifecycle (resolve, spawn, write, shutdown).
//! - [`mux`]: bounded-time multiplexing of the protocol and diagnostic pipes.
//! - [`correlate`]: response-by-id correlation with per-request deadlines.
//! - [`runner`]: the fixed smoke sequence and shape validation.

pub mod codec;
pub mod correlate;
pub mod driver;
pub mod errors;
pub mod message;
pub mod mux;
pub mod runner;

pub use errors::{AppError, Result};
