//! Unit tests for JSON-RPC envelope building and tolerant decoding.

use serde_json::json;

use aiq_smoke::message::{decode_response, encode_line, notification, request, JSONRPC_VERSION};

// ── Envelope builders ─────────────────────────────────────────────────────────

#[test]
fn request_carries_version_id_method_and_params() {
    let msg = request(1, "initialize", Some(json!({})));

    assert_eq!(msg["jsonrpc"], JSONRPC_VERSION);
    assert_eq!(msg["id"], 1);
    assert_eq!(msg["method"], "initialize");
    assert_eq!(msg["params"], json!({}), "params must exist and not be null");
}

#[test]
fn request_without_params_omits_the_field() {
    let msg = request(2, "tools/list", None);

    assert!(
        msg.get("params").is_none(),
        "tools/list carries no params field at all"
    );
}

#[test]
fn notification_has_no_id() {
    let msg = notification("notifications/initialized");

    assert_eq!(msg["method"], "notifications/initialized");
    assert!(msg.get("id").is_none(), "notifications never carry an id");
}

#[test]
fn encode_line_is_single_line_compact_json() {
    let msg = request(3, "tools/call", Some(json!({"arguments": {"name": "A\nB"}})));
    let line = encode_line(&msg).expect("encode must succeed");

    assert!(
        !line.contains('\n'),
        "encoded line must contain no embedded line terminators"
    );
    assert!(!line.contains(": "), "encoding must be compact");
}

// ── Tolerant decoding ─────────────────────────────────────────────────────────

#[test]
fn decode_skips_empty_and_malformed_lines() {
    assert!(decode_response("").is_none());
    assert!(decode_response("   ").is_none());
    assert!(decode_response("{not json").is_none());
    assert!(decode_response("plain diagnostic text").is_none());
}

#[test]
fn decode_accepts_result_and_error_responses() {
    let ok = decode_response(r#"{"jsonrpc":"2.0","id":1,"result":{"x":1}}"#)
        .expect("result response must decode");
    assert!(ok.matches(1));
    assert!(ok.result.is_some());
    assert!(ok.error.is_none());

    let err = decode_response(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32600}}"#)
        .expect("error response must decode");
    assert!(err.matches(2));
    assert!(err.error.is_some());
}

#[test]
fn id_matching_is_strict() {
    let resp = decode_response(r#"{"id":7,"result":null}"#).expect("must decode");

    assert!(resp.matches(7));
    assert!(!resp.matches(8), "id 7 must never answer an await for id 8");
}

#[test]
fn message_without_id_matches_nothing() {
    let resp = decode_response(r#"{"method":"log","params":{"msg":"hi"}}"#)
        .expect("server notification is well-formed JSON");

    assert!(
        !resp.matches(1),
        "a message lacking an id is not actionable for correlation"
    );
}
