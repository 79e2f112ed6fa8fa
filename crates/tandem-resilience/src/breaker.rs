//! Circuit Breaker Registry
//!
//! One independent state machine per target URL. State transitions:
//!
//! - **CLOSED → OPEN**: `failure_threshold` consecutive failures
//! - **OPEN → HALF_OPEN**: the recovery timeout elapses and the next gate
//!   check observes it
//! - **HALF_OPEN → CLOSED**: `success_threshold` consecutive successes
//! - **HALF_OPEN → OPEN**: any failure, re-arming the recovery timeout
//!
//! While OPEN, [`CircuitBreakerRegistry::check`] fails fast with
//! `CIRCUIT_OPEN` and no I/O happens. Transitions are serialized per key:
//! each entry sits behind its own mutex, so observers can never see a state
//! that disagrees with the counters that justified it. HALF_OPEN admits
//! multiple concurrent probes; recovery is driven by success/failure
//! accumulation rather than a single-probe latch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{info, warn};

use tandem_common::config::CircuitBreakerConfig;
use tandem_common::protocol::{Result, TandemError};

/// Breaker state, serialized with the wire-visible names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF_OPEN")]
    HalfOpen,
}

#[derive(Debug)]
struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    next_attempt_at: Option<Instant>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            next_attempt_at: None,
        }
    }
}

/// Point-in-time view of one breaker entry, for metrics snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Milliseconds until an OPEN circuit admits a probe; `None` unless OPEN.
    pub retry_in_ms: Option<u64>,
}

/// Per-target circuit breaker registry keyed by service URL.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    entries: RwLock<HashMap<String, Arc<Mutex<BreakerEntry>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, target: &str) -> Arc<Mutex<BreakerEntry>> {
        if let Some(entry) = self.entries.read().unwrap().get(target) {
            return entry.clone();
        }
        self.entries
            .write()
            .unwrap()
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new())))
            .clone()
    }

    /// Gate an outbound call against `target`.
    ///
    /// Fails with `CIRCUIT_OPEN` while the circuit is OPEN and the recovery
    /// timeout has not elapsed; the first check after it elapses moves the
    /// entry to HALF_OPEN and admits the call.
    pub fn check(&self, target: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let entry = self.entry(target);
        let mut entry = entry.lock().unwrap();
        match entry.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let ready = entry
                    .next_attempt_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if ready {
                    entry.state = CircuitState::HalfOpen;
                    entry.success_count = 0;
                    info!(target = %target, "Circuit breaker half-open, probing");
                    Ok(())
                } else {
                    Err(TandemError::CircuitOpen(target.to_string()))
                }
            }
        }
    }

    /// Record a successful call against `target`.
    pub fn record_success(&self, target: &str) {
        if !self.config.enabled {
            return;
        }

        let entry = self.entry(target);
        let mut entry = entry.lock().unwrap();
        match entry.state {
            CircuitState::Closed => {
                entry.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                entry.success_count += 1;
                if entry.success_count >= self.config.success_threshold {
                    entry.state = CircuitState::Closed;
                    entry.failure_count = 0;
                    entry.success_count = 0;
                    entry.next_attempt_at = None;
                    info!(target = %target, "Circuit breaker closed after recovery");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call against `target`.
    ///
    /// Returns `true` when this failure tripped the circuit to OPEN, so the
    /// caller can count the trip.
    pub fn record_failure(&self, target: &str) -> bool {
        if !self.config.enabled {
            return false;
        }

        let entry = self.entry(target);
        let mut entry = entry.lock().unwrap();
        entry.last_failure_at = Some(Instant::now());
        match entry.state {
            CircuitState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.config.failure_threshold {
                    entry.state = CircuitState::Open;
                    entry.next_attempt_at = Some(Instant::now() + self.config.recovery_timeout());
                    warn!(
                        target = %target,
                        failures = entry.failure_count,
                        "Circuit breaker opened"
                    );
                    return true;
                }
                false
            }
            CircuitState::HalfOpen => {
                entry.state = CircuitState::Open;
                entry.success_count = 0;
                entry.next_attempt_at = Some(Instant::now() + self.config.recovery_timeout());
                warn!(target = %target, "Circuit breaker re-opened from half-open");
                true
            }
            CircuitState::Open => false,
        }
    }

    /// Manually reset `target` to CLOSED with zeroed counters.
    pub fn reset(&self, target: &str) {
        let entry = self.entry(target);
        let mut entry = entry.lock().unwrap();
        *entry = BreakerEntry::new();
        info!(target = %target, "Circuit breaker manually reset");
    }

    /// Current state for `target`, if the registry has seen it.
    pub fn state(&self, target: &str) -> Option<CircuitState> {
        let entries = self.entries.read().unwrap();
        entries.get(target).map(|e| e.lock().unwrap().state)
    }

    /// Per-target snapshot map for metrics.
    pub fn snapshot(&self) -> HashMap<String, BreakerSnapshot> {
        let entries = self.entries.read().unwrap();
        let now = Instant::now();
        entries
            .iter()
            .map(|(target, entry)| {
                let entry = entry.lock().unwrap();
                let retry_in_ms = match entry.state {
                    CircuitState::Open => entry
                        .next_attempt_at
                        .map(|at| at.saturating_duration_since(now).as_millis() as u64),
                    _ => None,
                };
                (
                    target.clone(),
                    BreakerSnapshot {
                        state: entry.state,
                        failure_count: entry.failure_count,
                        success_count: entry.success_count,
                        retry_in_ms,
                    },
                )
            })
            .collect()
    }
}
