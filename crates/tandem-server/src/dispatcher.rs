//! Inbound Dispatcher
//!
//! The per-request lifecycle: CORS preflight, health check, authentication,
//! body accumulation under the 1 MiB cap, method lookup, claim injection,
//! bulkhead admission, handler invocation, envelope shaping, and the single
//! metrics update. Exactly one response envelope is written per dispatched
//! request, and the outermost layer converts every failure into a classified
//! envelope; nothing escapes to the transport raw.

use http::{header, Method, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

use tandem_common::auth::extract_bearer_token;
use tandem_common::protocol::{
    error_envelope, success_envelope, Result, TandemError, MAX_REQUEST_SIZE,
};
use tandem_resilience::REASON_CAPACITY;

use crate::endpoint::Endpoint;
use crate::health;

pub(crate) async fn dispatch(
    endpoint: Arc<Endpoint>,
    req: http::Request<Incoming>,
) -> Response<Full<Bytes>> {
    if req.method() == Method::OPTIONS {
        return preflight_response(&endpoint);
    }

    let path = req.uri().path().to_string();
    let method_name = path.strip_prefix('/').unwrap_or(&path).to_string();

    // The health check is served on the path itself and never requires
    // authentication or a registered method.
    if method_name == "health-check" {
        let report = health::health_report(&endpoint);
        return json_response(&endpoint, StatusCode::OK, success_envelope(report));
    }

    let started = Instant::now();
    let (status, body) = match process(&endpoint, req, &method_name).await {
        Ok(data) => (StatusCode::OK, success_envelope(data)),
        Err(err) => (err.http_status(), error_envelope(&err)),
    };

    endpoint
        .metrics
        .record_request(started.elapsed(), status.is_success());

    json_response(&endpoint, status, body)
}

async fn process(
    endpoint: &Arc<Endpoint>,
    req: http::Request<Incoming>,
    method_name: &str,
) -> Result<Value> {
    if req.method() != Method::POST {
        return Err(TandemError::BadRequest(
            "methods are invoked with POST".into(),
        ));
    }

    let claims = match &endpoint.verifier {
        Some(verifier) if !endpoint.config().auth_excluded(method_name) => {
            let header_value = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            let Some(token) = extract_bearer_token(header_value) else {
                endpoint.metrics.increment_auth_failures();
                return Err(TandemError::Unauthorized(
                    "Missing Authorization bearer token".into(),
                ));
            };
            match verifier.verify(token) {
                Ok(claims) => Some(claims),
                Err(err) => {
                    endpoint.metrics.increment_auth_failures();
                    debug!(method = %method_name, reason = err.reason(), "Rejected bearer token");
                    return Err(TandemError::Unauthorized(format!("Invalid token: {}", err)));
                }
            }
        }
        _ => None,
    };

    let body = read_body(req.into_body()).await?;
    let mut params = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| TandemError::InvalidJson(e.to_string()))?;
        if !value.is_object() {
            return Err(TandemError::InvalidJson(
                "request body must be a JSON object".into(),
            ));
        }
        value
    };

    let handler = endpoint
        .method(method_name)
        .ok_or_else(|| TandemError::MethodNotFound {
            method: method_name.to_string(),
            available: endpoint.method_names(),
        })?;

    if let Some(claims) = claims {
        params["_user"] = serde_json::to_value(&claims)?;
    }

    // The permit is held across the handler and released on drop, on every
    // exit path.
    let _permit = match endpoint.bulkheads.get(method_name) {
        Some(bulkhead) => Some(bulkhead.acquire().await.map_err(|err| {
            if let TandemError::BulkheadExceeded { reason, .. } = &err {
                if reason == REASON_CAPACITY {
                    endpoint.metrics.increment_bulkhead_rejections();
                }
            }
            err
        })?),
        None => None,
    };

    match handler(params).await {
        Ok(value) => Ok(value),
        Err(err) => {
            error!(method = %method_name, error = %err, "Handler failed");
            Err(TandemError::Internal(err.to_string()))
        }
    }
}

/// Accumulate the request body, rejecting as soon as the running total
/// crosses the cap; returning early drops the stream.
async fn read_body(mut body: Incoming) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame =
            frame.map_err(|e| TandemError::Transport(format!("failed to read request body: {}", e)))?;
        if let Some(data) = frame.data_ref() {
            if buf.len() + data.len() > MAX_REQUEST_SIZE {
                return Err(TandemError::PayloadTooLarge(
                    buf.len() + data.len(),
                    MAX_REQUEST_SIZE,
                ));
            }
            buf.extend_from_slice(data);
        }
    }
    Ok(buf)
}

fn json_response(endpoint: &Endpoint, status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(&body).unwrap_or_default();
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    builder = apply_cors(endpoint, builder);
    builder.body(Full::new(Bytes::from(bytes))).unwrap()
}

fn preflight_response(endpoint: &Endpoint) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(StatusCode::OK);
    builder = apply_cors(endpoint, builder);
    builder.body(Full::default()).unwrap()
}

fn apply_cors(endpoint: &Endpoint, mut builder: http::response::Builder) -> http::response::Builder {
    if let Some(cors) = &endpoint.config().cors {
        builder = builder
            .header("Access-Control-Allow-Origin", cors.origin.as_str())
            .header("Access-Control-Allow-Methods", cors.methods.as_str())
            .header("Access-Control-Allow-Headers", cors.headers.as_str());
    }
    builder
}
