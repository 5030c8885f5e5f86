//! Server process driver.
//!
//! Owns the child-process lifecycle for one smoke run: resolve the server
//! binary on `PATH`, spawn it with piped stdio and `kill_on_drop(true)`,
//! write framed request lines to its stdin with an immediate flush, and tear
//! it down exactly once on every exit path.
//!
//! Shutdown is graceful-then-forced: SIGTERM on unix followed by a bounded
//! wait, escalating to a hard kill if the process lingers.  It is idempotent
//! and never errors; a process that already exited is a race, not a failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Bounded wait for the child to exit after a graceful termination request.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Locate the server executable on `PATH`.
///
/// Accepts either a bare name (resolved against `PATH`) or a path containing
/// a separator (checked directly), matching `which` semantics.
///
/// # Errors
///
/// Returns [`AppError::Setup`] when the executable cannot be found; this is
/// a fatal setup error, reported before any I/O is attempted.
pub fn resolve_server_bin(name: &str) -> Result<PathBuf> {
    which::which(name)
        .map_err(|err| AppError::Setup(format!("server binary `{name}` not found: {err}")))
}

/// Active stdio connection to the spawned server process.
///
/// The handle owns the child (with `kill_on_drop(true)` as a backstop) and
/// its stdin.  The two output pipes are surrendered once via
/// [`ServerHandle::take_output`] so the stream mux can own them for the rest
/// of the run.
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    stdin: ChildStdin,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// Spawn the server process in `workspace_root` with fully piped stdio.
///
/// No ready signal is awaited: the MCP protocol starts with the client's
/// `initialize` request, so the first observable server output is already a
/// protocol line.
///
/// # Errors
///
/// Returns [`AppError::Spawn`] if the OS spawn fails or a stdio pipe cannot
/// be captured.
pub fn spawn(bin: &Path, workspace_root: &Path) -> Result<ServerHandle> {
    let mut cmd = Command::new(bin);
    cmd.current_dir(workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn {}: {err}", bin.display())))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture server stderr".into()))?;

    info!(
        bin = %bin.display(),
        workspace = %workspace_root.display(),
        pid = child.id().unwrap_or(0),
        "server process spawned"
    );

    Ok(ServerHandle {
        child,
        stdin,
        stdout: Some(stdout),
        stderr: Some(stderr),
    })
}

impl ServerHandle {
    /// Take the protocol (stdout) and diagnostic (stderr) pipes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Spawn`] if the pipes were already taken.
    pub fn take_output(&mut self) -> Result<(ChildStdout, ChildStderr)> {
        match (self.stdout.take(), self.stderr.take()) {
            (Some(out), Some(err)) => Ok((out, err)),
            _ => Err(AppError::Spawn("server output pipes already taken".into())),
        }
    }

    /// Write one framed line to the server's stdin and flush immediately.
    ///
    /// The server reads line-by-line and must observe each request promptly,
    /// so no write buffering is permitted.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the write or flush fails (e.g. the server
    /// process has exited and the pipe is closed).
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');

        self.stdin
            .write_all(&bytes)
            .await
            .map_err(|e| AppError::Io(format!("write to server stdin failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AppError::Io(format!("flush of server stdin failed: {e}")))?;

        debug!(len = line.len(), "request line written");
        Ok(())
    }

    /// Terminate the server process and reap it, swallowing all errors.
    ///
    /// Requests graceful termination (SIGTERM on unix, a hard kill
    /// elsewhere), waits up to [`SHUTDOWN_WAIT`], then escalates to a hard
    /// kill.  Safe to call any number of times: signalling an already-exited
    /// process is ignored, and `Child::wait` returns the cached exit status
    /// on repeat calls.  `kill_on_drop(true)` remains the backstop for paths
    /// that never reach this method.
    pub async fn shutdown(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id().and_then(|p| i32::try_from(p).ok()) {
                let _ = nix::sys::signal::kill(
                    nix::unistd::Pid::from_raw(pid),
                    nix::sys::signal::Signal::SIGTERM,
                );
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(SHUTDOWN_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "server process reaped"),
            Ok(Err(err)) => warn!(%err, "error waiting for server process"),
            Err(_elapsed) => {
                warn!("server ignored graceful termination, killing");
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
            }
        }
    }
}
