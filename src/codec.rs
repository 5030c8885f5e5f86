//! Line codec for the server's output pipes.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length to prevent memory exhaustion caused by unterminated or maliciously
//! large output from a misbehaving server process.
//!
//! # Usage
//!
//! Use [`SmokeCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the child's stdout (protocol
//! stream) and stderr (diagnostic stream).  Framing is UTF-8 lines delimited
//! by `\n`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted on either server pipe: 1 MiB.
///
/// Lines exceeding this limit cause [`SmokeCodec::decode`] to return
/// [`AppError::Codec`] with `"line too long"` rather than allocating
/// unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line codec for the server's protocol and diagnostic streams.
///
/// Delegates line-framing to [`LinesCodec`] with a fixed
/// [`MAX_LINE_BYTES`] limit.  Each newline-terminated (`\n`) UTF-8 string is
/// one complete transport line; whether it is JSON is the message layer's
/// concern, not the codec's.
#[derive(Debug)]
pub struct SmokeCodec(LinesCodec);

impl SmokeCodec {
    /// Create a new `SmokeCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for SmokeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SmokeCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet
    /// (buffering).  Returns `Err(AppError::Codec("line too long: …"))` when
    /// the line exceeds [`MAX_LINE_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final line when the stream reaches EOF.
    ///
    /// Delegates to [`LinesCodec::decode_eof`], applying the same error
    /// mapping.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Codec(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
