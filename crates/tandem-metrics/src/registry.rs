// Copyright 2026 Tandem Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tandem_resilience::{BreakerSnapshot, BulkheadSnapshot};

use crate::snapshot::MetricsSnapshot;

/// Running mean of response time.
///
/// Updated under a mutex: the `(mean, samples)` pair must move together.
#[derive(Debug, Default)]
struct ResponseTimeMean {
    mean_ms: f64,
    samples: u64,
}

impl ResponseTimeMean {
    fn record(&mut self, sample_ms: f64) {
        self.samples += 1;
        self.mean_ms += (sample_ms - self.mean_ms) / self.samples as f64;
    }
}

/// Thread-safe metrics registry.
///
/// Counters are monotonic atomics updated with relaxed ordering on the hot
/// path; only the running mean takes a lock.
#[derive(Debug)]
pub struct MetricsRegistry {
    request_count: AtomicU64,
    error_count: AtomicU64,
    retry_count: AtomicU64,
    auth_failures: AtomicU64,
    timeout_count: AtomicU64,
    circuit_breaker_trips: AtomicU64,
    bulkhead_rejections: AtomicU64,
    response_time: Mutex<ResponseTimeMean>,
    start_time: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            timeout_count: AtomicU64::new(0),
            circuit_breaker_trips: AtomicU64::new(0),
            bulkhead_rejections: AtomicU64::new(0),
            response_time: Mutex::new(ResponseTimeMean::default()),
            start_time: Instant::now(),
        }
    }

    pub fn increment_retries(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_auth_failures(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_timeouts(&self) {
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_breaker_trips(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bulkhead_rejections(&self) {
        self.bulkhead_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched request: the request counter, the error counter
    /// when the response was non-2xx, and the response-time running mean.
    pub fn record_request(&self, elapsed: Duration, success: bool) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        let sample_ms = elapsed.as_secs_f64() * 1000.0;
        self.response_time.lock().unwrap().record(sample_ms);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Assemble the full snapshot, folding in the per-target breaker and
    /// per-method bulkhead views supplied by the endpoint.
    pub fn snapshot(
        &self,
        circuit_breakers: HashMap<String, BreakerSnapshot>,
        bulkheads: HashMap<String, BulkheadSnapshot>,
    ) -> MetricsSnapshot {
        let response_time = self.response_time.lock().unwrap();
        MetricsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            timeout_count: self.timeout_count.load(Ordering::Relaxed),
            circuit_breaker_trips: self.circuit_breaker_trips.load(Ordering::Relaxed),
            bulkhead_rejections: self.bulkhead_rejections.load(Ordering::Relaxed),
            avg_response_time_ms: response_time.mean_ms,
            uptime_ms: self.uptime_ms(),
            circuit_breakers,
            bulkheads,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn snapshot(registry: &MetricsRegistry) -> MetricsSnapshot {
        registry.snapshot(HashMap::new(), HashMap::new())
    }

    #[test]
    fn test_request_and_error_counters() {
        let registry = MetricsRegistry::new();
        registry.record_request(Duration::from_millis(10), true);
        registry.record_request(Duration::from_millis(20), false);
        registry.record_request(Duration::from_millis(30), true);

        let snap = snapshot(&registry);
        assert_eq!(snap.request_count, 3);
        assert_eq!(snap.error_count, 1);
    }

    #[test]
    fn test_running_mean() {
        let registry = MetricsRegistry::new();
        registry.record_request(Duration::from_millis(10), true);
        registry.record_request(Duration::from_millis(20), true);
        registry.record_request(Duration::from_millis(30), true);

        let snap = snapshot(&registry);
        assert!((snap.avg_response_time_ms - 20.0).abs() < 0.001);
    }

    #[test]
    fn test_resilience_counters() {
        let registry = MetricsRegistry::new();
        registry.increment_retries();
        registry.increment_retries();
        registry.increment_auth_failures();
        registry.increment_timeouts();
        registry.increment_breaker_trips();
        registry.increment_bulkhead_rejections();

        let snap = snapshot(&registry);
        assert_eq!(snap.retry_count, 2);
        assert_eq!(snap.auth_failures, 1);
        assert_eq!(snap.timeout_count, 1);
        assert_eq!(snap.circuit_breaker_trips, 1);
        assert_eq!(snap.bulkhead_rejections, 1);
    }

    #[test]
    fn test_uptime_advances() {
        let registry = MetricsRegistry::new();
        thread::sleep(Duration::from_millis(10));
        assert!(registry.uptime_ms() >= 10);
    }

    #[test]
    fn test_thread_safety() {
        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    registry.record_request(Duration::from_millis(5), true);
                    registry.increment_retries();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = snapshot(&registry);
        assert_eq!(snap.request_count, 8000);
        assert_eq!(snap.retry_count, 8000);
        assert!((snap.avg_response_time_ms - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_serializes() {
        let registry = MetricsRegistry::new();
        registry.record_request(Duration::from_millis(12), true);

        let snap = snapshot(&registry);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["request_count"], 1);
        assert!(json["circuit_breakers"].as_object().unwrap().is_empty());
        assert!(json["bulkheads"].as_object().unwrap().is_empty());
    }
}
