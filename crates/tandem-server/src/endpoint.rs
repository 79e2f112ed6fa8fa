//! Tandem Endpoint
//!
//! The process-wide object exposing both RPC surfaces: a method registry
//! served over HTTP/2 and an outbound client for invoking peers. Both sides
//! share one circuit-breaker registry and one metrics registry, so a process
//! that serves and calls accounts everything in one place.

use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

use tandem_client::{CallOptions, TandemClient};
use tandem_common::auth::JwtVerifier;
use tandem_common::config::{BulkheadConfig, EndpointConfig};
use tandem_common::protocol::{Result, TandemError};
use tandem_metrics::{MetricsRegistry, MetricsSnapshot};
use tandem_resilience::{BulkheadRegistry, CircuitBreakerRegistry};

use crate::http_server::{self, ServerHandle};

/// Default graceful-stop window before connections are force-closed.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_millis(5000);

/// Environment flag suppressing signal-handler installation under test
/// harnesses.
pub const NO_SIGNAL_HANDLERS_ENV: &str = "TANDEM_NO_SIGNAL_HANDLERS";

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A registered method: takes the decoded parameter object, returns a value
/// or fails.
pub type MethodHandler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`MethodHandler`].
///
/// ```
/// use tandem_server::handler;
/// use serde_json::json;
///
/// let echo = handler(|params| async move { Ok(params) });
/// let add = handler(|p: serde_json::Value| async move {
///     let a = p["a"].as_i64().unwrap_or(0);
///     let b = p["b"].as_i64().unwrap_or(0);
///     Ok(json!({"result": a + b}))
/// });
/// # let _ = (echo, add);
/// ```
pub fn handler<F, Fut>(f: F) -> MethodHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// Bidirectional RPC endpoint.
///
/// Created once per process. Owns the method registry, the resilience
/// registries, the metrics, and the (optional) listening server; destroyed
/// via [`Endpoint::stop`].
pub struct Endpoint {
    config: Arc<EndpointConfig>,
    methods: RwLock<HashMap<String, MethodHandler>>,
    pub(crate) bulkheads: Arc<BulkheadRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) metrics: Arc<MetricsRegistry>,
    pub(crate) verifier: Option<JwtVerifier>,
    client: TandemClient,
    server: Mutex<Option<ServerHandle>>,
}

impl Endpoint {
    /// Build an endpoint from a validated configuration.
    pub fn new(config: EndpointConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let verifier = match &config.jwt {
            Some(jwt) => Some(JwtVerifier::new(jwt)?),
            None => None,
        };

        let config = Arc::new(config);
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.resilience.circuit_breaker.clone(),
        ));
        let metrics = Arc::new(MetricsRegistry::new());
        let client = TandemClient::with_shared(config.clone(), breakers.clone(), metrics.clone());

        Ok(Arc::new(Self {
            config,
            methods: RwLock::new(HashMap::new()),
            bulkheads: Arc::new(BulkheadRegistry::new()),
            breakers,
            metrics,
            verifier,
            client,
            server: Mutex::new(None),
        }))
    }

    /// Build an endpoint with an initial method set, binding the server at
    /// construction when `start_server` is set or any methods were supplied.
    pub async fn with_methods(
        config: EndpointConfig,
        methods: Vec<(String, MethodHandler)>,
    ) -> Result<Arc<Self>> {
        let start = config.start_server || !methods.is_empty();
        let endpoint = Self::new(config)?;
        for (name, handler) in methods {
            endpoint.add_method(name, handler)?;
        }
        if start {
            endpoint.start().await?;
        }
        Ok(endpoint)
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Register a method under the endpoint's default bulkhead.
    ///
    /// Re-registering an existing name replaces the handler silently, with a
    /// warning log.
    pub fn add_method(&self, name: impl Into<String>, handler: MethodHandler) -> Result<()> {
        let default_bulkhead = self.config.bulkhead.clone();
        self.add_method_with_bulkhead(name, handler, default_bulkhead)
    }

    /// Register a method with its own bulkhead configuration.
    pub fn add_method_with_bulkhead(
        &self,
        name: impl Into<String>,
        handler: MethodHandler,
        bulkhead: BulkheadConfig,
    ) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(TandemError::Config("method name must not be empty".into()));
        }
        if name.contains('/') {
            return Err(TandemError::Config(format!(
                "method name '{}' must not contain '/'",
                name
            )));
        }
        EndpointConfig::validate_bulkhead(&bulkhead)?;

        let replaced = {
            let mut methods = self.methods.write().unwrap();
            methods.insert(name.clone(), handler).is_some()
        };
        if replaced {
            warn!(method = %name, "Method re-registered, previous handler replaced");
        }
        self.bulkheads.register(&name, bulkhead);
        Ok(())
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.read().unwrap().contains_key(name)
    }

    pub(crate) fn method(&self, name: &str) -> Option<MethodHandler> {
        self.methods.read().unwrap().get(name).cloned()
    }

    /// Invoke `method` on a peer endpoint through the outbound pipeline.
    pub async fn call(
        &self,
        service_url: &str,
        method: &str,
        params: Value,
        options: &CallOptions,
    ) -> Result<Value> {
        self.client.call(service_url, method, params, options).await
    }

    /// Outbound client sharing this endpoint's breakers and metrics.
    pub fn client(&self) -> &TandemClient {
        &self.client
    }

    /// Full metrics snapshot including the per-target circuit and per-method
    /// bulkhead maps.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.breakers.snapshot(), self.bulkheads.snapshot())
    }

    /// Manually reset the circuit for `target` to CLOSED.
    pub fn reset_circuit_breaker(&self, target: &str) {
        self.breakers.reset(target);
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Bind the HTTP/2 server on the configured host and port.
    ///
    /// Resolves with the bound address once the listener is accepting, or
    /// rejects on bind error. Starting an already-listening endpoint returns
    /// the existing address.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        if let Some(handle) = self.server.lock().unwrap().as_ref() {
            return Ok(handle.local_addr());
        }

        let handle = http_server::bind(self.clone(), &self.config.bind_addr()).await?;
        let local_addr = handle.local_addr();
        *self.server.lock().unwrap() = Some(handle);
        info!(addr = %local_addr, "Endpoint listening");

        if self.config.install_signal_handlers && std::env::var(NO_SIGNAL_HANDLERS_ENV).is_err() {
            self.install_signal_handlers();
        }

        Ok(local_addr)
    }

    /// Stop the server gracefully, force-closing after `timeout`
    /// (default 5000 ms). Stopping a not-started endpoint succeeds silently.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<()> {
        let handle = self.server.lock().unwrap().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let timeout = timeout.unwrap_or(DEFAULT_STOP_TIMEOUT);
        handle.shutdown(timeout).await;
        info!("Endpoint stopped");
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.server.lock().unwrap().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().unwrap().as_ref().map(|h| h.local_addr())
    }

    fn install_signal_handlers(self: &Arc<Self>) {
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping endpoint");
            if let Err(err) = endpoint.stop(None).await {
                error!(error = %err, "Error during signal-triggered stop");
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "Failed to install SIGTERM handler");
            let _ = ctrl_c.await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn endpoint() -> Arc<Endpoint> {
        Endpoint::new(EndpointConfig::default()).unwrap()
    }

    #[test]
    fn test_add_method_and_lookup() {
        let ep = endpoint();
        ep.add_method("echo", handler(|params| async move { Ok(params) }))
            .unwrap();

        assert!(ep.has_method("echo"));
        assert!(!ep.has_method("ghost"));
        assert_eq!(ep.method_names(), vec!["echo".to_string()]);
        assert!(ep.method("echo").is_some());
    }

    #[test]
    fn test_re_registration_replaces() {
        let ep = endpoint();
        ep.add_method("m", handler(|_| async { Ok(json!(1)) })).unwrap();
        ep.add_method("m", handler(|_| async { Ok(json!(2)) })).unwrap();
        assert_eq!(ep.method_names().len(), 1);
    }

    #[test]
    fn test_invalid_method_names_rejected() {
        let ep = endpoint();
        assert!(ep
            .add_method("", handler(|_| async { Ok(json!(null)) }))
            .is_err());
        assert!(ep
            .add_method("a/b", handler(|_| async { Ok(json!(null)) }))
            .is_err());
    }

    #[test]
    fn test_invalid_bulkhead_rejected_at_registration() {
        let ep = endpoint();
        let bad = BulkheadConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(ep
            .add_method_with_bulkhead("m", handler(|_| async { Ok(json!(null)) }), bad)
            .is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EndpointConfig {
            port: 0,
            ..Default::default()
        };
        assert!(Endpoint::new(config).is_err());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_silent() {
        let ep = endpoint();
        assert!(!ep.is_listening());
        ep.stop(None).await.unwrap();
        ep.stop(None).await.unwrap();
    }

    #[test]
    fn test_reset_circuit_breaker_round_trip() {
        let ep = endpoint();
        ep.breakers().record_failure("http://peer");
        ep.reset_circuit_breaker("http://peer");

        let snapshot = ep.metrics_snapshot();
        let entry = snapshot.circuit_breakers.get("http://peer").unwrap();
        assert_eq!(entry.failure_count, 0);
        assert_eq!(
            serde_json::to_value(&entry.state).unwrap(),
            json!("CLOSED")
        );
    }
}
