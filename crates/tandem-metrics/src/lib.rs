//! Tandem Metrics Collection
//!
//! Thread-safe runtime metrics for a Tandem endpoint: monotonic counters for
//! requests, errors, retries, auth failures, timeouts, breaker trips, and
//! bulkhead rejections, plus a running mean of response time and uptime.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: lock-free counter storage (atomic increments on the
//!   hot path, a mutex only around the running mean)
//! - [`MetricsSnapshot`]: serializable point-in-time view, including the
//!   nested per-target circuit breaker and per-method bulkhead maps
//!
//! The registry is shared as an `Arc` between the inbound dispatcher and the
//! outbound client so both surfaces account into the same counters. The full
//! snapshot is exposed through the `/health-check` report.

mod registry;
mod snapshot;

pub use registry::MetricsRegistry;
pub use snapshot::MetricsSnapshot;
