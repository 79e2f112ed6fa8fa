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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use tandem_resilience::{BreakerSnapshot, BulkheadSnapshot};

/// Complete metrics snapshot.
///
/// Everything the endpoint exposes through the health report: the monotonic
/// counters, the running mean of response time, uptime, and the nested
/// per-target circuit and per-method bulkhead views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub retry_count: u64,
    pub auth_failures: u64,
    pub timeout_count: u64,
    pub circuit_breaker_trips: u64,
    pub bulkhead_rejections: u64,
    pub avg_response_time_ms: f64,
    pub uptime_ms: u64,
    pub circuit_breakers: HashMap<String, BreakerSnapshot>,
    pub bulkheads: HashMap<String, BulkheadSnapshot>,
}

impl MetricsSnapshot {
    pub fn empty(uptime_ms: u64) -> Self {
        Self {
            request_count: 0,
            error_count: 0,
            retry_count: 0,
            auth_failures: 0,
            timeout_count: 0,
            circuit_breaker_trips: 0,
            bulkhead_rejections: 0,
            avg_response_time_ms: 0.0,
            uptime_ms,
            circuit_breakers: HashMap::new(),
            bulkheads: HashMap::new(),
        }
    }
}
