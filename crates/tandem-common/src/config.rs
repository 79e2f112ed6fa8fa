//! Endpoint Configuration
//!
//! This module defines the configuration surface of a Tandem endpoint and its
//! eager validation. Every option is checked up front; an invalid shape fails
//! with a classified configuration error before anything binds or dials.
//!
//! # Example
//!
//! ```
//! use tandem_common::config::EndpointConfig;
//!
//! let mut config = EndpointConfig::default();
//! config.port = 8080;
//! config.resilience.retry.max_retries = 5;
//! config.validate().unwrap();
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

use crate::protocol::error::{Result, TandemError};

/// CORS response header configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origin: String,
    pub methods: String,
    pub headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: "*".into(),
            methods: "GET, POST, OPTIONS".into(),
            headers: "Content-Type, Authorization".into(),
        }
    }
}

/// JWT RS256 verification configuration.
///
/// Presence of this config enables bearer-token authentication on every
/// method except the excluded paths.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// RSA public key in PEM form used to verify RS256 signatures.
    pub public_key_pem: String,
    /// Expected `iss` claim. Unset means the claim is not checked.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim. Unset means the claim is not checked.
    #[serde(default)]
    pub audience: Option<String>,
}

/// Outbound timeout configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub enabled: bool,
    /// Bound over the full send + receive of one attempt.
    pub request_timeout_ms: u64,
    /// Bound over TCP connect + HTTP/2 handshake of one attempt.
    pub connection_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout_ms: 30_000,
            connection_timeout_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive failures before tripping CLOSED → OPEN.
    pub failure_threshold: u32,
    /// Cooling-off period before an OPEN circuit admits a probe.
    pub recovery_timeout_ms: u64,
    /// Successes required in HALF_OPEN before closing again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            success_threshold: 3,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Retry configuration for outbound calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Additional attempts after the first; the loop runs `max_retries + 1`
    /// attempts in total.
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    /// ±25% symmetric jitter on each computed delay.
    pub jitter: bool,
    /// HTTP statuses that are considered transient.
    pub retry_on: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            jitter: true,
            retry_on: vec![500, 502, 503, 504],
        }
    }
}

/// Partial retry overlay.
///
/// This is the legacy `retryOptions` shape: any field left unset falls
/// through to the underlying [`RetryConfig`]. Also used for per-call
/// overrides on the outbound client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter: Option<bool>,
    pub retry_on: Option<Vec<u16>>,
}

impl RetryOverrides {
    /// Apply the set fields on top of `base`.
    pub fn apply(&self, base: &mut RetryConfig) {
        if let Some(v) = self.max_retries {
            base.max_retries = v;
        }
        if let Some(v) = self.initial_delay_ms {
            base.initial_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            base.max_delay_ms = v;
        }
        if let Some(v) = self.backoff_factor {
            base.backoff_factor = v;
        }
        if let Some(v) = self.jitter {
            base.jitter = v;
        }
        if let Some(v) = &self.retry_on {
            base.retry_on = v.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max_retries.is_none()
            && self.initial_delay_ms.is_none()
            && self.max_delay_ms.is_none()
            && self.backoff_factor.is_none()
            && self.jitter.is_none()
            && self.retry_on.is_none()
    }
}

/// Per-method bulkhead configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    pub enabled: bool,
    /// Concurrent executions admitted before queueing starts.
    pub max_concurrent: usize,
    /// Waiters held in FIFO order once `max_concurrent` is reached.
    pub max_queue: usize,
    /// How long a waiter may sit in the queue before rejection.
    pub queue_timeout_ms: u64,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 10,
            max_queue: 20,
            queue_timeout_ms: 10_000,
        }
    }
}

impl BulkheadConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

/// Resilience pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub timeout: TimeoutConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

/// Top-level endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Listen port (1..=65535).
    pub port: u16,
    /// Listen host.
    pub host: String,
    /// Bind the server at construction even without an explicit start.
    pub start_server: bool,
    /// CORS headers; absent means CORS is disabled.
    pub cors: Option<CorsConfig>,
    /// JWT verification; absent means auth is disabled.
    pub jwt: Option<JwtConfig>,
    /// Method names that bypass authentication. `health-check` is always
    /// exempt whether or not it is listed here.
    pub excluded_paths: HashSet<String>,
    pub resilience: ResilienceConfig,
    /// Legacy partial retry overlay, merged into `resilience.retry` with
    /// higher precedence.
    pub retry_overrides: Option<RetryOverrides>,
    /// Default bulkhead applied to methods registered without their own.
    pub bulkhead: BulkheadConfig,
    /// Install SIGINT/SIGTERM handlers that trigger a graceful stop.
    pub install_signal_handlers: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "localhost".into(),
            start_server: false,
            cors: None,
            jwt: None,
            excluded_paths: HashSet::new(),
            resilience: ResilienceConfig::default(),
            retry_overrides: None,
            bulkhead: BulkheadConfig::default(),
            install_signal_handlers: false,
        }
    }
}

impl EndpointConfig {
    /// Validate every option eagerly.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TandemError::Config("port must be in 1..=65535".into()));
        }
        if self.host.is_empty() {
            return Err(TandemError::Config("host must not be empty".into()));
        }

        let timeout = &self.resilience.timeout;
        if timeout.request_timeout_ms == 0 || timeout.connection_timeout_ms == 0 {
            return Err(TandemError::Config("timeouts must be positive".into()));
        }

        let breaker = &self.resilience.circuit_breaker;
        if breaker.failure_threshold == 0 || breaker.success_threshold == 0 {
            return Err(TandemError::Config(
                "circuit breaker thresholds must be positive".into(),
            ));
        }
        if breaker.recovery_timeout_ms == 0 {
            return Err(TandemError::Config(
                "circuit breaker recovery timeout must be positive".into(),
            ));
        }

        Self::validate_retry(&self.effective_retry())?;
        Self::validate_bulkhead(&self.bulkhead)?;

        if self.excluded_paths.iter().any(|p| p.is_empty()) {
            return Err(TandemError::Config(
                "excluded paths must be non-empty method names".into(),
            ));
        }

        Ok(())
    }

    pub fn validate_retry(retry: &RetryConfig) -> Result<()> {
        if retry.initial_delay_ms == 0 || retry.max_delay_ms == 0 {
            return Err(TandemError::Config("retry delays must be positive".into()));
        }
        if retry.backoff_factor < 1.0 || !retry.backoff_factor.is_finite() {
            return Err(TandemError::Config(
                "retry backoff factor must be a finite value >= 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn validate_bulkhead(bulkhead: &BulkheadConfig) -> Result<()> {
        if bulkhead.max_concurrent == 0 || bulkhead.max_queue == 0 {
            return Err(TandemError::Config(
                "bulkhead capacities must be positive".into(),
            ));
        }
        if bulkhead.queue_timeout_ms == 0 {
            return Err(TandemError::Config(
                "bulkhead queue timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Retry configuration with the legacy overlay applied.
    pub fn effective_retry(&self) -> RetryConfig {
        let mut retry = self.resilience.retry.clone();
        if let Some(overrides) = &self.retry_overrides {
            overrides.apply(&mut retry);
        }
        retry
    }

    /// Whether `method` bypasses authentication.
    pub fn auth_excluded(&self, method: &str) -> bool {
        method == "health-check" || self.excluded_paths.contains(method)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EndpointConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "localhost");
        assert!(!config.start_server);
        assert!(config.cors.is_none());
        assert!(config.jwt.is_none());

        assert_eq!(config.resilience.timeout.request_timeout_ms, 30_000);
        assert_eq!(config.resilience.timeout.connection_timeout_ms, 5_000);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.resilience.circuit_breaker.recovery_timeout_ms, 60_000);
        assert_eq!(config.resilience.circuit_breaker.success_threshold, 3);
        assert_eq!(config.resilience.retry.max_retries, 3);
        assert_eq!(config.resilience.retry.initial_delay_ms, 500);
        assert_eq!(config.resilience.retry.max_delay_ms, 10_000);
        assert_eq!(config.resilience.retry.backoff_factor, 2.0);
        assert!(config.resilience.retry.jitter);
        assert_eq!(config.resilience.retry.retry_on, vec![500, 502, 503, 504]);

        assert_eq!(config.bulkhead.max_concurrent, 10);
        assert_eq!(config.bulkhead.max_queue, 20);
        assert_eq!(config.bulkhead.queue_timeout_ms, 10_000);

        config.validate().unwrap();
    }

    #[test]
    fn test_zero_port_rejected() {
        let config = EndpointConfig {
            port: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_empty_host_rejected() {
        let config = EndpointConfig {
            host: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_factor_below_one_rejected() {
        let mut config = EndpointConfig::default();
        config.resilience.retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bulkhead_capacity_rejected() {
        let mut config = EndpointConfig::default();
        config.bulkhead.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_overrides_take_precedence() {
        let mut config = EndpointConfig::default();
        config.resilience.retry.max_retries = 3;
        config.retry_overrides = Some(RetryOverrides {
            max_retries: Some(7),
            initial_delay_ms: Some(100),
            ..Default::default()
        });

        let effective = config.effective_retry();
        assert_eq!(effective.max_retries, 7);
        assert_eq!(effective.initial_delay_ms, 100);
        // Untouched fields fall through to the base config.
        assert_eq!(effective.max_delay_ms, 10_000);
        assert_eq!(effective.backoff_factor, 2.0);
    }

    #[test]
    fn test_invalid_override_caught_by_validate() {
        let mut config = EndpointConfig::default();
        config.retry_overrides = Some(RetryOverrides {
            backoff_factor: Some(0.0),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_health_check_always_auth_excluded() {
        let config = EndpointConfig::default();
        assert!(config.auth_excluded("health-check"));
        assert!(!config.auth_excluded("echo"));

        let mut config = EndpointConfig::default();
        config.excluded_paths.insert("public-status".into());
        assert!(config.auth_excluded("public-status"));
        assert!(config.auth_excluded("health-check"));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "port": 9000,
            "host": "0.0.0.0",
            "excluded_paths": ["status"],
            "resilience": {
                "retry": { "max_retries": 1 },
                "circuit_breaker": { "failure_threshold": 2 }
            },
            "retry_overrides": { "initial_delay_ms": 50 }
        }"#;

        let config: EndpointConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 2);
        // Unspecified nested fields keep their defaults.
        assert_eq!(config.resilience.circuit_breaker.success_threshold, 3);
        assert_eq!(config.effective_retry().max_retries, 1);
        assert_eq!(config.effective_retry().initial_delay_ms, 50);
    }

    #[test]
    fn test_bind_addr() {
        let config = EndpointConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }
}
