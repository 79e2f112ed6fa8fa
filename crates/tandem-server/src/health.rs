//! Health Report
//!
//! The `/health-check` payload: process status, uptime, RFC 3339 timestamp,
//! the RPC mode verdict, the full metrics snapshot, the registered method
//! list, and the authentication mode.

use serde_json::{json, Value};

use crate::endpoint::Endpoint;

/// Build the health report served under `/health-check`.
///
/// The `rpc` section is chosen by what the process is actually doing:
/// methods registered and listening is a healthy server; methods registered
/// without a listener is a critical error (the process believes it serves
/// but nothing can reach it); no methods at all is a healthy client-only
/// endpoint.
pub(crate) fn health_report(endpoint: &Endpoint) -> Value {
    let methods = endpoint.method_names();
    let listening = endpoint.is_listening();
    let metrics = endpoint.metrics_snapshot();

    let rpc = if !methods.is_empty() && listening {
        json!({
            "status": "ok",
            "mode": "server",
            "details": format!("{} methods registered and listening", methods.len()),
        })
    } else if !methods.is_empty() {
        json!({
            "status": "error",
            "error": "methods registered but server is not listening",
            "details": format!("{} methods registered, no listener bound", methods.len()),
            "critical": true,
        })
    } else {
        json!({
            "status": "ok",
            "mode": "client-only",
            "details": "no methods registered, outbound calls only",
        })
    };

    json!({
        "status": "ok",
        "uptime": metrics.uptime_ms,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "rpc": rpc,
        "metrics": metrics,
        "methods": methods,
        "auth": if endpoint.verifier.is_some() { "JWT RS256" } else { "disabled" },
    })
}
