//! Pending insight request registry
//!
//! Maps correlation ids to one-shot resolvers for in-flight insight
//! queries. Resolution is exactly-once and matched by exact id; a response
//! carrying an unknown or already-resolved id is dropped with a log line,
//! never delivered to a different waiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use super::types::AdInsight;

pub struct PendingInsightRegistry {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Option<AdInsight>>>>,
}

impl PendingInsightRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new in-flight query; returns its correlation id and the
    /// receiver that resolves exactly once
    pub fn register(&self) -> (u64, oneshot::Receiver<Option<AdInsight>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Resolve the query with this exact id. Returns false when the id is
    /// unknown or was already resolved.
    pub fn resolve(&self, id: u64, insight: Option<AdInsight>) -> bool {
        let sender = self.pending.lock().remove(&id);
        match sender {
            Some(tx) => tx.send(insight).is_ok(),
            None => {
                debug!(request_id = id, "Dropping insight response with no pending request");
                false
            }
        }
    }

    /// Abandon a query (e.g. the waiter gave up); the eventual response is
    /// then dropped by `resolve`
    pub fn forget(&self, id: u64) {
        self.pending.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for PendingInsightRegistry {
    fn default() -> Self {
        Self::new()
    }
}
