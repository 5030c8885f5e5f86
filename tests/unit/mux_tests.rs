//! Unit tests for the stream mux.
//!
//! Uses in-memory duplex pipes instead of a real child process; the paused
//! tokio clock keeps the slice-timing assertions deterministic and fast.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use aiq_smoke::mux::{StreamMux, StreamTag, POLL_SLICE};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Collect batches until the mux reports both streams closed.
async fn drain(mux: &mut StreamMux) -> Vec<(StreamTag, String)> {
    let mut out = Vec::new();
    while !mux.is_exhausted() {
        out.extend(mux.poll_lines(POLL_SLICE).await);
    }
    out
}

// ── Tagging and ordering ──────────────────────────────────────────────────────

/// Interleaved writes across both pipes come back tagged by origin, with
/// per-stream emission order preserved and no line lost or misattributed.
#[tokio::test]
async fn interleaved_lines_are_tagged_and_ordered() {
    let (mut proto_tx, proto_rx) = tokio::io::duplex(4096);
    let (mut diag_tx, diag_rx) = tokio::io::duplex(4096);
    let mut mux = StreamMux::new(proto_rx, diag_rx);

    // Interleave in an arbitrary relative order.
    proto_tx.write_all(b"{\"id\":1}\n").await.unwrap();
    diag_tx.write_all(b"indexing started\n").await.unwrap();
    proto_tx.write_all(b"{\"id\":2}\n").await.unwrap();
    diag_tx.write_all(b"indexing 42 symbols\n").await.unwrap();
    diag_tx.write_all(b"indexing done\n").await.unwrap();
    drop(proto_tx);
    drop(diag_tx);

    let lines = drain(&mut mux).await;

    let protocol: Vec<&str> = lines
        .iter()
        .filter(|(tag, _)| *tag == StreamTag::Protocol)
        .map(|(_, line)| line.as_str())
        .collect();
    let diagnostic: Vec<&str> = lines
        .iter()
        .filter(|(tag, _)| *tag == StreamTag::Diagnostic)
        .map(|(_, line)| line.as_str())
        .collect();

    assert_eq!(protocol, ["{\"id\":1}", "{\"id\":2}"]);
    assert_eq!(
        diagnostic,
        ["indexing started", "indexing 42 symbols", "indexing done"],
        "diagnostic lines must survive in emission order"
    );
}

/// A quiescent diagnostic stream must not stall protocol reads (and vice
/// versa): a line on one pipe is returned even though the other never
/// produces anything.
#[tokio::test]
async fn one_quiet_stream_does_not_starve_the_other() {
    let (mut proto_tx, proto_rx) = tokio::io::duplex(4096);
    let (_diag_tx, diag_rx) = tokio::io::duplex(4096);
    let mut mux = StreamMux::new(proto_rx, diag_rx);

    proto_tx.write_all(b"{\"id\":9}\n").await.unwrap();

    let lines = mux.poll_lines(POLL_SLICE).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0], (StreamTag::Protocol, "{\"id\":9}".to_owned()));
}

// ── Slice timing ──────────────────────────────────────────────────────────────

/// With no data available, `poll_lines` returns empty after one slice —
/// never blocks longer.
#[tokio::test(start_paused = true)]
async fn empty_poll_is_bounded_by_the_slice() {
    let (_proto_tx, proto_rx) = tokio::io::duplex(64);
    let (_diag_tx, diag_rx) = tokio::io::duplex(64);
    let mut mux = StreamMux::new(proto_rx, diag_rx);

    let started = Instant::now();
    let lines = mux.poll_lines(Duration::from_millis(200)).await;
    let elapsed = started.elapsed();

    assert!(lines.is_empty());
    assert!(
        elapsed >= Duration::from_millis(200),
        "must wait out the slice, waited {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(300),
        "must not overshoot the slice, waited {elapsed:?}"
    );
}

// ── EOF handling ──────────────────────────────────────────────────────────────

/// Closed pipes are excluded from future polling: after EOF on both streams
/// the mux sleeps out each slice instead of busy-looping.
#[tokio::test(start_paused = true)]
async fn closed_pipes_are_not_busy_polled() {
    let (proto_tx, proto_rx) = tokio::io::duplex(64);
    let (diag_tx, diag_rx) = tokio::io::duplex(64);
    let mut mux = StreamMux::new(proto_rx, diag_rx);

    drop(proto_tx);
    drop(diag_tx);

    let started = Instant::now();
    let first = mux.poll_lines(Duration::from_millis(200)).await;
    assert!(first.is_empty());
    assert!(mux.is_exhausted(), "EOF on both pipes must be recorded");

    let second = mux.poll_lines(Duration::from_millis(200)).await;
    assert!(second.is_empty());

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(400),
        "each post-EOF poll must still sleep its slice, waited {elapsed:?}"
    );
}

/// EOF on one pipe only: the surviving pipe keeps producing lines.
#[tokio::test]
async fn survivor_stream_keeps_producing_after_peer_eof() {
    let (mut proto_tx, proto_rx) = tokio::io::duplex(4096);
    let (diag_tx, diag_rx) = tokio::io::duplex(4096);
    let mut mux = StreamMux::new(proto_rx, diag_rx);

    drop(diag_tx);

    proto_tx.write_all(b"{\"id\":1}\n").await.unwrap();
    let first = mux.poll_lines(POLL_SLICE).await;
    assert!(first.contains(&(StreamTag::Protocol, "{\"id\":1}".to_owned())));

    proto_tx.write_all(b"{\"id\":2}\n").await.unwrap();
    let second = mux.poll_lines(POLL_SLICE).await;
    assert!(second.contains(&(StreamTag::Protocol, "{\"id\":2}".to_owned())));
}
