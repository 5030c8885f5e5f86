//! Bounded-time multiplexing of the server's two output pipes.
//!
//! The protocol (stdout) and diagnostic (stderr) streams can produce output
//! in any relative order and at any time.  Reading one to completion before
//! checking the other would deadlock whenever the server writes diagnostics
//! while the harness waits on the protocol stream, so both are merged into a
//! single tagged line stream with [`futures_util::stream::select`], which
//! polls the two sides fairly — neither can starve the other.
//!
//! The merged stream is consumed in short bounded slices
//! ([`StreamMux::poll_lines`]) so that an overall per-request deadline can be
//! enforced across many slices by the correlator.

use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{self, Stream, StreamExt};
use futures_util::FutureExt;
use tokio::io::AsyncRead;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tracing::warn;

use crate::codec::SmokeCodec;

/// Default polling slice used by the correlator loop.
pub const POLL_SLICE: Duration = Duration::from_millis(200);

/// Which server pipe a line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTag {
    /// The server's stdout: framed JSON-RPC protocol lines.
    Protocol,
    /// The server's stderr: free-form operator-facing text.
    Diagnostic,
}

type TaggedItem = (StreamTag, crate::Result<String>);

/// Merged, tagged view over the server's protocol and diagnostic pipes.
///
/// Generic over any pair of [`AsyncRead`] sources so tests can drive it with
/// in-memory duplex pipes instead of a real child process.
pub struct StreamMux {
    merged: Pin<Box<dyn Stream<Item = TaggedItem> + Send>>,
    /// Set once both underlying streams have reached EOF; polling after that
    /// sleeps out the slice instead of busy-looping on a closed pipe.
    exhausted: bool,
}

impl std::fmt::Debug for StreamMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMux")
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl StreamMux {
    /// Build a mux over a protocol source and a diagnostic source.
    ///
    /// Each source is framed line-by-line with [`SmokeCodec`] and tagged with
    /// its [`StreamTag`] before merging.
    #[must_use]
    pub fn new<P, D>(protocol: P, diagnostic: D) -> Self
    where
        P: AsyncRead + Unpin + Send + 'static,
        D: AsyncRead + Unpin + Send + 'static,
    {
        let protocol = FramedRead::new(protocol, SmokeCodec::new())
            .map(|item| (StreamTag::Protocol, item));
        let diagnostic = FramedRead::new(diagnostic, SmokeCodec::new())
            .map(|item| (StreamTag::Diagnostic, item));

        Self {
            merged: Box::pin(stream::select(protocol, diagnostic)),
            exhausted: false,
        }
    }

    /// Whether both underlying pipes have reached EOF.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Collect the lines that become available within one `slice`.
    ///
    /// Returns zero or more complete lines tagged by origin stream.  Waits at
    /// most `slice` for the first line; once one arrives, whatever else is
    /// already buffered is drained without further waiting, so a burst of
    /// interleaved output comes back in a single batch in arrival order.
    ///
    /// A closed pipe is treated as "no data available": after both streams
    /// reach EOF the remainder of the slice is slept away rather than
    /// spinning, and subsequent calls sleep the full slice.  Framing errors
    /// (oversized lines) are logged and skipped — they are noise on a stream
    /// that may carry arbitrary text.
    pub async fn poll_lines(&mut self, slice: Duration) -> Vec<(StreamTag, String)> {
        let mut out = Vec::new();

        if self.exhausted {
            tokio::time::sleep(slice).await;
            return out;
        }

        let deadline = Instant::now() + slice;
        match tokio::time::timeout(slice, self.merged.next()).await {
            Err(_elapsed) => return out,
            Ok(None) => {
                self.exhausted = true;
                tokio::time::sleep(deadline.saturating_duration_since(Instant::now())).await;
                return out;
            }
            Ok(Some(item)) => collect_item(&mut out, item),
        }

        // Drain lines that are already buffered without waiting further.
        loop {
            match self.merged.next().now_or_never() {
                None => break,
                Some(None) => {
                    self.exhausted = true;
                    break;
                }
                Some(Some(item)) => collect_item(&mut out, item),
            }
        }

        out
    }
}

/// Push a decoded line into `out`, skipping framing errors with a warning.
fn collect_item(out: &mut Vec<(StreamTag, String)>, (tag, item): TaggedItem) {
    match item {
        Ok(line) => out.push((tag, line)),
        Err(err) => warn!(?tag, %err, "framing error on server stream, skipping line"),
    }
}
