//! Inter-process coordination primitives
//!
//! Two small pieces of shared machinery live here:
//!
//! - [`InvalidationBus`]: the cache-invalidation fan-out. A worker that
//!   mutates a collection publishes the collection's URL prefix; every
//!   other worker subscribed to the bus evicts its own cache entries
//!   under that prefix. Delivery is best effort — TTL expiry is the
//!   backstop, so a lost notice degrades freshness, never correctness.
//! - [`ProgressBoard`]: correlation-id keyed progress snapshots pushed by
//!   long-running operations (CSV ingestion, bulk matching). Callers poll
//!   and reset; the engine only ever writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// A cache-invalidation notice for one collection prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationNotice {
    /// Key prefix whose cached entries must be evicted
    pub prefix: String,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast fan-out for cache invalidation across workers
///
/// The supervising environment relays each notice to every worker except
/// the sender; within one process this is a `tokio::sync::broadcast`
/// channel, and a subscriber never observes its own publications unless
/// it subscribes to itself.
#[derive(Clone)]
pub struct InvalidationBus {
    tx: broadcast::Sender<InvalidationNotice>,
}

impl InvalidationBus {
    /// Create a bus buffering up to `capacity` undelivered notices
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an invalidation notice to all subscribers
    ///
    /// Returns the number of subscribers reached; zero subscribers is not
    /// an error, the notice is simply dropped.
    pub fn publish(&self, prefix: &str) -> usize {
        let notice = InvalidationNotice {
            prefix: prefix.to_string(),
            timestamp: Utc::now(),
        };
        match self.tx.send(notice) {
            Ok(count) => {
                debug!(prefix = %prefix, receivers = count, "Invalidation published");
                count
            }
            Err(_) => {
                debug!(prefix = %prefix, "No subscribers for invalidation notice");
                0
            }
        }
    }

    /// Subscribe to all future invalidation notices
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationNotice> {
        self.tx.subscribe()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One progress snapshot for a long-running operation
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressSnapshot {
    pub status: Option<String>,
    pub error: Option<String>,
    pub percent: Option<f64>,
}

impl ProgressSnapshot {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            error: None,
            percent: None,
        }
    }

    pub fn percent(status: impl Into<String>, percent: f64) -> Self {
        Self {
            status: Some(status.into()),
            error: None,
            percent: Some(percent),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: None,
            error: Some(error.into()),
            percent: None,
        }
    }
}

/// Shared progress store keyed by caller correlation id
#[derive(Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<RwLock<HashMap<String, ProgressSnapshot>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for a correlation id
    pub async fn set(&self, correlation_id: &str, snapshot: ProgressSnapshot) {
        self.inner
            .write()
            .await
            .insert(correlation_id.to_string(), snapshot);
    }

    /// Current snapshot for a correlation id, if any
    pub async fn get(&self, correlation_id: &str) -> Option<ProgressSnapshot> {
        self.inner.read().await.get(correlation_id).cloned()
    }

    /// Drop the snapshot for a correlation id
    pub async fn reset(&self, correlation_id: &str) {
        self.inner.write().await.remove(correlation_id);
    }
}
