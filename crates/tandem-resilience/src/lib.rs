//! Tandem Resilience Primitives
//!
//! The three mechanisms composing the resilience pipeline around every RPC:
//!
//! - [`breaker`] - per-target circuit breaker (CLOSED / OPEN / HALF_OPEN)
//!   gating outbound calls
//! - [`bulkhead`] - per-method admission control bounding inbound concurrency
//! - [`retry`] - bounded retry loop with exponential backoff and jitter
//!
//! Outbound calls run breaker gate → retry loop → timeout-wrapped attempt;
//! inbound dispatch admits through the method's bulkhead before the handler
//! runs. All three are transport-agnostic: they see only the error taxonomy
//! from `tandem-common`.

pub mod breaker;
pub mod bulkhead;
pub mod retry;

pub use breaker::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
pub use bulkhead::{
    BulkheadPermit, BulkheadRegistry, BulkheadSnapshot, MethodBulkhead, REASON_CAPACITY,
    REASON_QUEUE_TIMEOUT,
};
pub use retry::{compute_delay, run_with_retry, should_retry};
