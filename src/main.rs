#![forbid(unsafe_code)]

//! `aiq-smoke` — smoke-test harness binary for the `aiq-mcp` stdio server.
//!
//! Spawns the server in the given workspace, runs the fixed protocol
//! sequence, prints one `<step>.ok` line per verified step, and maps the
//! outcome to a process exit code: 0 on success, 2 on usage/setup errors,
//! 1 on protocol-level failure.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::{fmt, EnvFilter};

use aiq_smoke::correlate::{DiagnosticBuffer, DIAGNOSTIC_TAIL};
use aiq_smoke::runner::{self, SmokeConfig, CALL_TIMEOUT};
use aiq_smoke::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "aiq-smoke", about = "Smoke-test harness for the aiq-mcp stdio server", version, long_about = None)]
struct Cli {
    /// Working directory for the spawned server — the project root to index.
    workspace: PathBuf,

    /// Symbol name passed to the sample tool invocation.
    #[arg(default_value = "Bezier3Segment")]
    target: String,

    /// Server executable, resolved on PATH.
    #[arg(long, default_value = "aiq-mcp")]
    server_bin: String,

    /// Tool invoked by the sample call.
    #[arg(long, default_value = "query_type")]
    tool: String,

    /// Value forwarded as the sample call's `membersLimit` argument.
    #[arg(long, default_value_t = 1)]
    members_limit: u64,

    /// Timeout for the tools/call step, in seconds.
    #[arg(long, default_value_t = CALL_TIMEOUT.as_secs())]
    call_timeout_secs: u64,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("FAIL: {err}");
        return ExitCode::from(err.exit_code());
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("FAIL: failed to build tokio runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(args))
}

async fn run(args: Cli) -> ExitCode {
    let mut config = SmokeConfig::new(args.workspace);
    config.server_bin = args.server_bin;
    config.tool = args.tool;
    config.target = args.target;
    config.members_limit = args.members_limit;
    config.call_timeout = Duration::from_secs(args.call_timeout_secs);

    let mut diagnostics = DiagnosticBuffer::new();

    match runner::run_smoke(&config, &mut diagnostics).await {
        Ok(_summary) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "smoke run failed");
            eprintln!("FAIL: {err}");

            if !diagnostics.is_empty() {
                eprintln!("\n== {} stderr tail ==", config.server_bin);
                for line in diagnostics.tail(DIAGNOSTIC_TAIL) {
                    eprintln!("{line}");
                }
            }

            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Logs go to stderr; stdout is reserved for the step-result lines.
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Setup(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Setup(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
