//! Per-Method Bulkhead
//!
//! Admission control that caps concurrency per registered method. Up to
//! `max_concurrent` executions run at once; the next `max_queue` admission
//! requests wait in FIFO order for at most `queue_timeout`; everything beyond
//! that is rejected immediately.
//!
//! Admission returns an RAII [`BulkheadPermit`]; dropping it releases the
//! slot and hands it to the oldest live waiter. A waiter whose queue timer
//! fires concurrently with a hand-off gives the slot straight back, so
//! `active` can never exceed `max_concurrent` and every waiter resolves or
//! rejects exactly once.
//!
//! The inner state sits behind a plain mutex that is never held across an
//! await; the only suspension point is the waiter's oneshot receiver.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::oneshot;

use tandem_common::config::BulkheadConfig;
use tandem_common::protocol::{Result, TandemError};

/// Rejection reasons carried in the `METHOD_BULKHEAD_EXCEEDED` envelope.
pub const REASON_CAPACITY: &str = "capacity";
pub const REASON_QUEUE_TIMEOUT: &str = "queue_timeout";

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

struct BulkheadInner {
    active: usize,
    waiters: VecDeque<Waiter>,
    rejected_total: u64,
    next_waiter_id: u64,
}

/// Point-in-time view of one method's bulkhead, for metrics snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkheadSnapshot {
    pub active: usize,
    pub queued: usize,
    pub rejected_total: u64,
    pub max_concurrent: usize,
    pub max_queue: usize,
}

/// Admission control for a single method.
pub struct MethodBulkhead {
    method: String,
    config: BulkheadConfig,
    inner: Mutex<BulkheadInner>,
}

impl MethodBulkhead {
    pub fn new(method: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            method: method.into(),
            config,
            inner: Mutex::new(BulkheadInner {
                active: 0,
                waiters: VecDeque::new(),
                rejected_total: 0,
                next_waiter_id: 0,
            }),
        }
    }

    /// Request admission for one execution.
    ///
    /// Resolves with a permit once a slot is available, or fails with
    /// `METHOD_BULKHEAD_EXCEEDED`: reason `capacity` when the queue is full,
    /// reason `queue_timeout` when the wait exceeded `queue_timeout`.
    pub async fn acquire(self: &Arc<Self>) -> Result<BulkheadPermit> {
        if !self.config.enabled {
            return Ok(BulkheadPermit { bulkhead: None });
        }

        let (rx, waiter_id) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.active < self.config.max_concurrent {
                inner.active += 1;
                return Ok(BulkheadPermit {
                    bulkhead: Some(self.clone()),
                });
            }
            if inner.waiters.len() >= self.config.max_queue {
                inner.rejected_total += 1;
                return Err(TandemError::BulkheadExceeded {
                    method: self.method.clone(),
                    reason: REASON_CAPACITY.into(),
                });
            }
            let (tx, rx) = oneshot::channel();
            let id = inner.next_waiter_id;
            inner.next_waiter_id += 1;
            inner.waiters.push_back(Waiter { id, tx });
            (rx, id)
        };

        match tokio::time::timeout(self.config.queue_timeout(), rx).await {
            Ok(Ok(())) => Ok(BulkheadPermit {
                bulkhead: Some(self.clone()),
            }),
            Ok(Err(_)) => Err(TandemError::Internal(
                "bulkhead waiter channel closed".into(),
            )),
            Err(_) => {
                let mut inner = self.inner.lock().unwrap();
                let still_queued = inner
                    .waiters
                    .iter()
                    .position(|w| w.id == waiter_id)
                    .map(|i| inner.waiters.remove(i))
                    .is_some();
                if !still_queued {
                    // A release handed us the slot in the same instant the
                    // timer fired; hand it back.
                    Self::release_locked(&mut inner);
                }
                Err(TandemError::BulkheadExceeded {
                    method: self.method.clone(),
                    reason: REASON_QUEUE_TIMEOUT.into(),
                })
            }
        }
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        Self::release_locked(&mut inner);
    }

    fn release_locked(inner: &mut BulkheadInner) {
        while let Some(waiter) = inner.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                // Slot transferred to the waiter; active is unchanged.
                return;
            }
            // Receiver already gone (queue timeout raced the hand-off).
        }
        inner.active = inner.active.saturating_sub(1);
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn snapshot(&self) -> BulkheadSnapshot {
        let inner = self.inner.lock().unwrap();
        BulkheadSnapshot {
            active: inner.active,
            queued: inner.waiters.len(),
            rejected_total: inner.rejected_total,
            max_concurrent: self.config.max_concurrent,
            max_queue: self.config.max_queue,
        }
    }
}

/// RAII admission permit; dropping it releases the slot exactly once.
pub struct BulkheadPermit {
    bulkhead: Option<Arc<MethodBulkhead>>,
}

impl std::fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkheadPermit").finish()
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        if let Some(bulkhead) = self.bulkhead.take() {
            bulkhead.release();
        }
    }
}

/// Registry of per-method bulkheads, populated at method registration.
pub struct BulkheadRegistry {
    methods: RwLock<HashMap<String, Arc<MethodBulkhead>>>,
}

impl BulkheadRegistry {
    pub fn new() -> Self {
        Self {
            methods: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, method: &str, config: BulkheadConfig) {
        let bulkhead = Arc::new(MethodBulkhead::new(method, config));
        self.methods
            .write()
            .unwrap()
            .insert(method.to_string(), bulkhead);
    }

    pub fn get(&self, method: &str) -> Option<Arc<MethodBulkhead>> {
        self.methods.read().unwrap().get(method).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, BulkheadSnapshot> {
        let methods = self.methods.read().unwrap();
        methods
            .iter()
            .map(|(name, bulkhead)| (name.clone(), bulkhead.snapshot()))
            .collect()
    }
}

impl Default for BulkheadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
