//! Coherent bundle cache
//!
//! Per-process cache keyed by canonical query URL. Three rules govern it:
//!
//! - Only bundles with more than one entry are cached; empty and
//!   single-entry results are likely "no data yet" states that would
//!   otherwise be served stale until TTL expiry.
//! - A per-key in-flight marker bounds duplicate concurrent fetches
//!   within the process. A caller observing the marker does not queue on
//!   the fetch; it sleeps a fixed delay and re-checks cache and marker.
//!   The marker is cleared unconditionally after the fetch, success or
//!   failure, so a failed fetch never locks the key out permanently.
//! - Mutations evict by key prefix locally, then publish the prefix on
//!   the invalidation bus so sibling workers evict their own entries.
//!   Delivery is best effort; TTL expiry is the backstop.
//!
//! The cache is an explicit service object, constructed once and
//! injected, never ambient global state.

use crate::model::Bundle;
use faclink_common::events::InvalidationBus;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

struct CacheSlot {
    bundle: Bundle,
    inserted: Instant,
    ttl: Duration,
}

impl CacheSlot {
    fn is_expired(&self) -> bool {
        self.inserted.elapsed() >= self.ttl
    }
}

/// Per-process bundle cache with single-flight markers and prefix
/// invalidation
pub struct BundleCache {
    slots: RwLock<HashMap<String, CacheSlot>>,
    in_flight: Mutex<HashSet<String>>,
    bus: InvalidationBus,
}

impl BundleCache {
    pub fn new(bus: InvalidationBus) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            bus,
        }
    }

    /// Cached bundle for a key, if present and not expired
    pub async fn get(&self, key: &str) -> Option<Bundle> {
        {
            let slots = self.slots.read().await;
            match slots.get(key) {
                Some(slot) if !slot.is_expired() => {
                    debug!(key = %key, "Cache hit");
                    return Some(slot.bundle.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // expired: drop the slot before reporting a miss
        self.slots.write().await.remove(key);
        None
    }

    /// Cache a bundle under a key with the given TTL
    ///
    /// Bundles with one entry or fewer are not cached.
    pub async fn put(&self, key: &str, bundle: Bundle, ttl: Duration) {
        if bundle.len() <= 1 {
            debug!(key = %key, entries = bundle.len(), "Not more than 1 entry, not caching");
            return;
        }
        self.slots.write().await.insert(
            key.to_string(),
            CacheSlot {
                bundle,
                inserted: Instant::now(),
                ttl,
            },
        );
    }

    /// Acquire the in-flight marker for a key
    ///
    /// Returns false when another task in this process already holds it.
    pub async fn begin_fetch(&self, key: &str) -> bool {
        self.in_flight.lock().await.insert(key.to_string())
    }

    /// Clear the in-flight marker for a key
    pub async fn end_fetch(&self, key: &str) {
        self.in_flight.lock().await.remove(key);
    }

    /// Whether a fetch for the key is in flight in this process
    pub async fn fetch_in_progress(&self, key: &str) -> bool {
        self.in_flight.lock().await.contains(key)
    }

    /// Evict every local entry whose key starts with the prefix
    pub async fn invalidate(&self, prefix: &str) {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|key, _| !key.starts_with(prefix));
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(prefix = %prefix, evicted, "Evicted cache entries after mutation");
        }
    }

    /// Evict locally, then notify sibling workers to do the same
    pub async fn invalidate_remote(&self, prefix: &str) {
        self.invalidate(prefix).await;
        self.bus.publish(prefix);
    }

    /// Spawn a listener applying bus notices to a cache
    ///
    /// Each worker process runs one of these; the sender's own eviction
    /// happens synchronously in [`invalidate_remote`], so the listener
    /// only matters for notices published by siblings.
    pub fn listen(cache: &Arc<Self>, bus: &InvalidationBus) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(cache);
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(notice) = rx.recv().await {
                cache.invalidate(&notice.prefix).await;
            }
        })
    }

    /// Number of live (possibly expired) entries, for diagnostics
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
