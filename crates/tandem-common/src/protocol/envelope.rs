//! Response Envelope
//!
//! Every response body is a JSON envelope holding exactly one of:
//!
//! - success: `{"data": <value>}`
//! - failure: `{"error": <code>, "message": <string>, ...extra}`
//!
//! The `extra` fields depend on the code: `METHOD_NOT_FOUND` carries the
//! method name and the list of registered methods, `METHOD_BULKHEAD_EXCEEDED`
//! carries the rejection reason, `INTERNAL_ERROR` carries the handler error
//! in `details`, and `HTTP_<status>` carries the numeric status.

use serde_json::{json, Value};

use super::error::TandemError;

/// Maximum accepted request body size (1 MiB).
///
/// Bodies are accumulated frame by frame and the request is rejected with
/// `PAYLOAD_TOO_LARGE` as soon as the running total crosses this limit.
pub const MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Build a success envelope around a handler result.
pub fn success_envelope(data: Value) -> Value {
    json!({ "data": data })
}

/// Build a failure envelope for an error, including its code-specific extras.
pub fn error_envelope(err: &TandemError) -> Value {
    let mut envelope = match err {
        TandemError::MethodNotFound { method, available } => json!({
            "message": "Method not found",
            "method": method,
            "availableMethods": available,
        }),
        TandemError::BulkheadExceeded { method, reason } => json!({
            "message": format!("Too many concurrent requests for method '{}'", method),
            "method": method,
            "reason": reason,
        }),
        TandemError::Internal(details) => json!({
            "message": "Internal server error",
            "details": details,
        }),
        TandemError::Json(e) => json!({
            "message": "Internal server error",
            "details": e.to_string(),
        }),
        TandemError::Http { status, message } => json!({
            "message": message,
            "status": status,
        }),
        TandemError::PayloadTooLarge(_, limit) => json!({
            "message": err.to_string(),
            "limit": limit,
        }),
        other => json!({ "message": other.to_string() }),
    };

    envelope["error"] = json!(err.code());
    envelope
}

/// Decode a response envelope received from a peer.
///
/// Returns the `data` value on success; an envelope carrying `{error,
/// message}` is surfaced as [`TandemError::Remote`]. Bodies that are not an
/// envelope at all map to `PARSE_ERROR`.
pub fn decode_envelope(body: &[u8]) -> Result<Value, TandemError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| TandemError::ParseError(format!("response body is not JSON: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| TandemError::ParseError("response body is not an object".into()))?;

    if let Some(code) = obj.get("error").and_then(Value::as_str) {
        let message = obj
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(TandemError::Remote {
            code: code.to_string(),
            message,
        });
    }

    match obj.get("data") {
        Some(data) => Ok(data.clone()),
        None => Err(TandemError::ParseError(
            "response envelope has neither 'data' nor 'error'".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = success_envelope(json!({"m": "hi"}));
        assert_eq!(envelope, json!({"data": {"m": "hi"}}));
    }

    #[test]
    fn test_error_envelope_basic() {
        let err = TandemError::Unauthorized("missing bearer token".into());
        let envelope = error_envelope(&err);
        assert_eq!(envelope["error"], "UNAUTHORIZED");
        assert!(envelope["message"]
            .as_str()
            .unwrap()
            .contains("missing bearer token"));
    }

    #[test]
    fn test_error_envelope_method_not_found() {
        let err = TandemError::MethodNotFound {
            method: "ghost".into(),
            available: vec!["echo".into(), "add".into()],
        };
        let envelope = error_envelope(&err);
        assert_eq!(envelope["error"], "METHOD_NOT_FOUND");
        assert_eq!(envelope["message"], "Method not found");
        assert_eq!(envelope["method"], "ghost");
        assert_eq!(envelope["availableMethods"], json!(["echo", "add"]));
    }

    #[test]
    fn test_error_envelope_internal_details() {
        let err = TandemError::Internal("boom".into());
        let envelope = error_envelope(&err);
        assert_eq!(envelope["error"], "INTERNAL_ERROR");
        assert_eq!(envelope["message"], "Internal server error");
        assert_eq!(envelope["details"], "boom");
    }

    #[test]
    fn test_error_envelope_bulkhead_reason() {
        let err = TandemError::BulkheadExceeded {
            method: "slow".into(),
            reason: "queue_timeout".into(),
        };
        let envelope = error_envelope(&err);
        assert_eq!(envelope["error"], "METHOD_BULKHEAD_EXCEEDED");
        assert_eq!(envelope["reason"], "queue_timeout");
    }

    #[test]
    fn test_decode_envelope_data() {
        let body = br#"{"data": {"result": 8}}"#;
        let data = decode_envelope(body).unwrap();
        assert_eq!(data, json!({"result": 8}));
    }

    #[test]
    fn test_decode_envelope_error() {
        let body = br#"{"error": "METHOD_NOT_FOUND", "message": "Method not found"}"#;
        let err = decode_envelope(body).unwrap_err();
        match err {
            TandemError::Remote { code, message } => {
                assert_eq!(code, "METHOD_NOT_FOUND");
                assert_eq!(message, "Method not found");
            }
            other => panic!("Expected Remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_envelope_not_json() {
        let err = decode_envelope(b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_decode_envelope_missing_both_fields() {
        let err = decode_envelope(br#"{"ok": true}"#).unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_max_request_size_is_one_mib() {
        assert_eq!(MAX_REQUEST_SIZE, 1_048_576);
    }
}
