use http::uri::Uri;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use tandem_common::config::{EndpointConfig, RetryConfig, RetryOverrides, TimeoutConfig};
use tandem_common::protocol::{decode_envelope, Result, TandemError};
use tandem_metrics::MetricsRegistry;
use tandem_resilience::{run_with_retry, CircuitBreakerRegistry};

/// Per-call options for an outbound invocation.
///
/// The effective retry configuration is merged in three layers: the
/// endpoint's retry config, then `retry_options` (the legacy overlay shape),
/// then the top-level `retry` fields; later layers win.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Bearer token attached as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub connection_timeout_ms: Option<u64>,
    pub retry_options: Option<RetryOverrides>,
    pub retry: RetryOverrides,
}

/// Outbound RPC client.
///
/// Composes the resilience pipeline around each call: circuit-breaker gate,
/// then a retry loop where every attempt opens its own HTTP/2 session
/// bounded by the connection timeout, sends `POST /<method>` bounded by the
/// request timeout, and decodes the response envelope. Breaker state and
/// metrics are shared with the owning endpoint so both surfaces account into
/// the same registries.
pub struct TandemClient {
    config: Arc<EndpointConfig>,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<MetricsRegistry>,
}

impl TandemClient {
    /// Standalone client with its own breaker registry and metrics.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        config.validate()?;
        let breaker_config = config.resilience.circuit_breaker.clone();
        Ok(Self {
            config: Arc::new(config),
            breakers: Arc::new(CircuitBreakerRegistry::new(breaker_config)),
            metrics: Arc::new(MetricsRegistry::new()),
        })
    }

    /// Client sharing the endpoint's breaker registry and metrics.
    pub fn with_shared(
        config: Arc<EndpointConfig>,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            breakers,
            metrics,
        }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Invoke `method` on the endpoint at `service_url`.
    pub async fn call(
        &self,
        service_url: &str,
        method: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value> {
        let uri = validate_inputs(service_url, method, &params)?;
        let retry_config = self.effective_retry(options);
        let timeouts = self.effective_timeouts(options);

        // Gate before any I/O; an open circuit is not retried within a call.
        self.breakers.check(service_url)?;

        let target = service_url.to_string();
        let method = method.to_string();
        let metrics = self.metrics.clone();

        run_with_retry(
            &retry_config,
            move |_attempt| {
                let this = self.clone();
                let uri = uri.clone();
                let method = method.clone();
                let params = params.clone();
                let token = options.token.clone();
                let timeouts = timeouts.clone();
                let target = target.clone();
                async move {
                    match this.attempt(&uri, &method, &params, token.as_deref(), &timeouts).await {
                        Ok(value) => {
                            this.breakers.record_success(&target);
                            Ok(value)
                        }
                        Err(err) => {
                            if this.breakers.record_failure(&target) {
                                this.metrics.increment_breaker_trips();
                            }
                            Err(err)
                        }
                    }
                }
            },
            move |_, _| metrics.increment_retries(),
        )
        .await
    }

    /// One HTTP/2 attempt: connect, handshake, send, decode.
    ///
    /// The session is scoped to the attempt; the spawned connection driver
    /// is aborted once the response (or a timeout) is in.
    async fn attempt(
        &self,
        uri: &Uri,
        method: &str,
        params: &Value,
        token: Option<&str>,
        timeouts: &TimeoutConfig,
    ) -> Result<Value> {
        let host = uri
            .host()
            .ok_or_else(|| TandemError::BadRequest("service URL has no host".into()))?;
        let port = uri.port_u16().unwrap_or(80);
        let authority = format!("{}:{}", host, port);

        let connect = async {
            let stream = TcpStream::connect(&authority)
                .await
                .map_err(TandemError::from_io_class)?;
            let io = TokioIo::new(stream);
            hyper::client::conn::http2::handshake(TokioExecutor::new(), io)
                .await
                .map_err(|e| TandemError::Transport(format!("HTTP/2 handshake failed: {}", e)))
        };

        let (mut sender, conn) = if timeouts.enabled {
            match tokio::time::timeout(timeouts.connection_timeout(), connect).await {
                Ok(result) => result?,
                Err(_) => {
                    self.metrics.increment_timeouts();
                    return Err(TandemError::ConnectTimeout(timeouts.connection_timeout_ms));
                }
            }
        } else {
            connect.await?
        };

        let driver = tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!(error = %err, "HTTP/2 session ended with error");
            }
        });

        let request_uri: Uri = Uri::builder()
            .scheme("http")
            .authority(authority)
            .path_and_query(format!("/{}", method))
            .build()
            .map_err(|e| TandemError::BadRequest(format!("invalid request URI: {}", e)))?;

        let body = serde_json::to_vec(params)?;
        let mut builder = http::Request::builder()
            .method(http::Method::POST)
            .uri(request_uri)
            .header(http::header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TandemError::Internal(format!("failed to build request: {}", e)))?;

        let round_trip = async {
            let response = sender
                .send_request(request)
                .await
                .map_err(|e| TandemError::Transport(format!("request failed: {}", e)))?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TandemError::Transport(format!("failed to read response: {}", e)))?
                .to_bytes();
            Ok::<_, TandemError>((status, body))
        };

        let outcome = if timeouts.enabled {
            match tokio::time::timeout(timeouts.request_timeout(), round_trip).await {
                Ok(result) => result,
                Err(_) => {
                    driver.abort();
                    self.metrics.increment_timeouts();
                    return Err(TandemError::Timeout(timeouts.request_timeout_ms));
                }
            }
        } else {
            round_trip.await
        };
        driver.abort();

        let (status, body) = outcome?;
        if status.as_u16() >= 400 {
            let message = serde_json::from_slice::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("HTTP error")
                        .to_string()
                });
            return Err(TandemError::Http {
                status: status.as_u16(),
                message,
            });
        }

        decode_envelope(&body)
    }

    fn effective_retry(&self, options: &CallOptions) -> RetryConfig {
        let mut retry = self.config.effective_retry();
        if let Some(overrides) = &options.retry_options {
            overrides.apply(&mut retry);
        }
        options.retry.apply(&mut retry);
        retry
    }

    fn effective_timeouts(&self, options: &CallOptions) -> TimeoutConfig {
        let mut timeouts = self.config.resilience.timeout.clone();
        if let Some(ms) = options.request_timeout_ms {
            timeouts.request_timeout_ms = ms;
        }
        if let Some(ms) = options.connection_timeout_ms {
            timeouts.connection_timeout_ms = ms;
        }
        timeouts
    }
}

impl Clone for TandemClient {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            breakers: Arc::clone(&self.breakers),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

fn validate_inputs(service_url: &str, method: &str, params: &Value) -> Result<Uri> {
    let uri: Uri = service_url
        .parse()
        .map_err(|e| TandemError::BadRequest(format!("invalid service URL '{}': {}", service_url, e)))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(TandemError::BadRequest(format!(
                "unsupported URL scheme '{}': only http is served directly",
                other
            )))
        }
        None => {
            return Err(TandemError::BadRequest(
                "service URL must include the http:// prefix".into(),
            ))
        }
    }

    if method.is_empty() {
        return Err(TandemError::BadRequest("method name must not be empty".into()));
    }
    if method.contains('/') {
        return Err(TandemError::BadRequest(
            "method name must not contain '/'".into(),
        ));
    }
    if !params.is_object() {
        return Err(TandemError::BadRequest(
            "params must be a JSON object".into(),
        ));
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> TandemClient {
        TandemClient::new(EndpointConfig::default()).unwrap()
    }

    #[test]
    fn test_validate_inputs_accepts_http_url() {
        validate_inputs("http://127.0.0.1:8080", "echo", &json!({})).unwrap();
    }

    #[test]
    fn test_validate_inputs_rejects_bad_shapes() {
        assert!(validate_inputs("not a url", "echo", &json!({})).is_err());
        assert!(validate_inputs("ftp://host", "echo", &json!({})).is_err());
        assert!(validate_inputs("127.0.0.1:8080", "echo", &json!({})).is_err());
        assert!(validate_inputs("http://h", "", &json!({})).is_err());
        assert!(validate_inputs("http://h", "a/b", &json!({})).is_err());
        assert!(validate_inputs("http://h", "echo", &json!([1, 2])).is_err());
        assert!(validate_inputs("http://h", "echo", &json!("str")).is_err());
    }

    #[test]
    fn test_effective_retry_merge_precedence() {
        let mut config = EndpointConfig::default();
        config.resilience.retry.max_retries = 3;
        config.resilience.retry.initial_delay_ms = 500;
        let client = TandemClient::new(config).unwrap();

        let options = CallOptions {
            retry_options: Some(RetryOverrides {
                max_retries: Some(5),
                initial_delay_ms: Some(200),
                ..Default::default()
            }),
            retry: RetryOverrides {
                max_retries: Some(7),
                ..Default::default()
            },
            ..Default::default()
        };

        let effective = client.effective_retry(&options);
        // Top-level beats the legacy overlay, which beats the config.
        assert_eq!(effective.max_retries, 7);
        assert_eq!(effective.initial_delay_ms, 200);
        assert_eq!(effective.max_delay_ms, 10_000);
    }

    #[test]
    fn test_effective_timeouts_overridden_per_call() {
        let client = client();
        let options = CallOptions {
            request_timeout_ms: Some(1_000),
            ..Default::default()
        };
        let timeouts = client.effective_timeouts(&options);
        assert_eq!(timeouts.request_timeout_ms, 1_000);
        assert_eq!(timeouts.connection_timeout_ms, 5_000);
    }

    #[tokio::test]
    async fn test_call_rejects_invalid_params_without_io() {
        let client = client();
        let err = client
            .call("http://127.0.0.1:1", "echo", json!("not-an-object"), &CallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_client_is_clonable_and_shares_breakers() {
        let client = client();
        let clone = client.clone();
        assert!(Arc::ptr_eq(client.breakers(), clone.breakers()));
        assert!(Arc::ptr_eq(client.metrics(), clone.metrics()));
    }
}
