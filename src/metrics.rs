//! Process-lifetime counters, exposed via `/stats`.
//!
//! Grounded on the teacher's `ConnectionManager` (`AtomicUsize` hot counters
//! plus a mutex-guarded map, snapshotted under lock for `stats()`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::ErrorCode;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub messages_relayed: u64,
    pub bytes_transferred: u64,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub errors: HashMap<String, u64>,
}

/// Monotonically non-decreasing counters (spec.md §3 invariant 4). Atomics
/// carry the hot per-message path; the per-error-code table is small and
/// updated rarely enough that a mutex is the right tool.
#[derive(Debug, Default)]
pub struct Metrics {
    messages_relayed: AtomicU64,
    bytes_transferred: AtomicU64,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    errors: Mutex<HashMap<&'static str, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_relay(&self, bytes: usize) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.bytes_transferred
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_error(&self, code: ErrorCode) {
        let mut errors = self.errors.lock().await;
        *errors.entry(code.as_str()).or_insert(0) += 1;
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let errors = self
            .errors
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        MetricsSnapshot {
            messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_are_monotone() {
        let metrics = Metrics::new();
        metrics.record_relay(10);
        metrics.record_relay(20);
        metrics.record_error(ErrorCode::InvalidMessage).await;
        metrics.record_error(ErrorCode::InvalidMessage).await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.messages_relayed, 2);
        assert_eq!(snap.bytes_transferred, 30);
        assert_eq!(snap.errors.get("INVALID_MESSAGE"), Some(&2));
    }
}
