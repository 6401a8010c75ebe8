//! Cache-coherent location store
//!
//! Every read and write against a remote registry funnels through this
//! service. Whole-collection and hierarchy reads are cached with
//! single-flight protection; targeted queries (by id, identifier,
//! parent) go straight to the registry. Writes upsert or delete through
//! the client and then invalidate the mutated collection's prefix both
//! locally and across sibling workers, so invalidation can never be
//! bypassed by a caller holding only this store.
//!
//! Parent-chain resolution against the remote registry keeps a per-node
//! cache with a short TTL of its own. Those entries are keyed per node
//! and deliberately exempt from prefix invalidation; they only ever age
//! out.

use crate::cache::BundleCache;
use crate::client::RegistryClient;
use crate::hierarchy::{ParentDetail, ParentItem, ParentSummary};
use crate::model::{Bundle, Entry, Location, Position, Reference};
use faclink_common::config::Settings;
use faclink_common::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct ParentNode {
    id: String,
    name: String,
    position: Option<Position>,
    parent_ref: Option<String>,
}

impl ParentNode {
    fn item(&self, detail: ParentDetail) -> ParentItem {
        match detail {
            ParentDetail::Id => ParentItem::Id(self.id.clone()),
            ParentDetail::Name => ParentItem::Name(self.name.clone()),
            ParentDetail::Full => ParentItem::Full(ParentSummary {
                name: self.name.clone(),
                id: self.id.clone(),
                latitude: self.position.map(|p| p.latitude),
                longitude: self.position.map(|p| p.longitude),
            }),
        }
    }
}

/// Cache-coherent client for one remote location registry
pub struct LocationStore {
    client: RegistryClient,
    cache: Arc<BundleCache>,
    cache_ttl: Duration,
    parent_cache_ttl: Duration,
    fetch_retry_delay: Duration,
    parent_nodes: RwLock<HashMap<String, (ParentNode, Instant)>>,
}

impl LocationStore {
    pub fn new(settings: &Settings, cache: Arc<BundleCache>) -> Result<Self> {
        let registry = &settings.registry;
        let client = RegistryClient::new(
            &registry.base_url,
            registry.request_timeout_secs,
            registry.page_count_hint,
        )
        .map_err(|e| Error::Config(format!("Registry client init failed: {}", e)))?;

        Ok(Self {
            client,
            cache,
            cache_ttl: Duration::from_millis(registry.cache_ttl_ms),
            parent_cache_ttl: Duration::from_millis(registry.parent_cache_ttl_ms),
            fetch_retry_delay: Duration::from_millis(registry.fetch_retry_delay_ms),
            parent_nodes: RwLock::new(HashMap::new()),
        })
    }

    /// Canonical collection URL for a database, the cache-key prefix of
    /// everything queried under it
    pub fn collection_url(&self, database: &str) -> String {
        self.client.collection_url(database)
    }

    /// Provenance URL for one location, used as identifier value on
    /// mapping records
    pub fn location_url(&self, database: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(database), id)
    }

    /// Every location in a database, served from cache when possible
    pub async fn locations(&self, database: &str) -> Bundle {
        let key = self.collection_url(database);
        self.cached_fetch(&key, || self.client.fetch_all(database))
            .await
    }

    /// The whole hierarchy under a root, served from cache when possible
    pub async fn hierarchy(&self, database: &str, root_id: &str) -> Bundle {
        let key = format!("{}/{}/$hierarchy", self.collection_url(database), root_id);
        self.cached_fetch(&key, || self.client.fetch_hierarchy(database, root_id))
            .await
    }

    /// One location by id, uncached
    pub async fn by_id(&self, database: &str, id: &str) -> Bundle {
        self.client.fetch_by_id(database, id).await
    }

    /// Locations carrying an identifier value, uncached
    pub async fn by_identifier(&self, database: &str, identifier: &str) -> Bundle {
        self.client.fetch_by_identifier(database, identifier).await
    }

    /// Direct children of a location, uncached
    pub async fn children(&self, database: &str, parent_id: &str) -> Bundle {
        self.client.fetch_children(database, parent_id).await
    }

    /// Upsert a bundle, then invalidate the collection everywhere
    pub async fn save(&self, database: &str, bundle: &Bundle) -> Result<()> {
        if bundle.is_empty() {
            return Ok(());
        }
        self.client
            .upsert(database, bundle)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        self.cache
            .invalidate_remote(&self.collection_url(database))
            .await;
        Ok(())
    }

    /// Delete one location, then invalidate the collection everywhere
    pub async fn delete(&self, database: &str, id: &str) -> Result<()> {
        self.client
            .delete(database, id)
            .await
            .map_err(|e| Error::Registry(e.to_string()))?;
        self.cache
            .invalidate_remote(&self.collection_url(database))
            .await;
        Ok(())
    }

    /// Rename a location and re-point or clear its parent
    pub async fn edit_location(
        &self,
        database: &str,
        id: &str,
        name: &str,
        new_parent: Option<&str>,
    ) -> Result<()> {
        let existing = self.by_id(database, id).await;
        let Some(location) = existing.first() else {
            return Err(Error::NotFound(format!("Location {} in {}", id, database)));
        };
        let mut location = location.clone();
        location.name = name.to_string();

        match new_parent {
            Some(parent_id) => {
                let parents = self.by_id(database, parent_id).await;
                let Some(parent) = parents.first() else {
                    return Err(Error::NotFound(format!(
                        "Parent location {} in {}",
                        parent_id, database
                    )));
                };
                location.part_of = Some(Reference::to_location(&parent.id, Some(&parent.name)));
            }
            None => location.part_of = None,
        }

        let mut bundle = Bundle::batch();
        bundle.entry.push(Entry::upsert(location));
        self.save(database, &bundle).await
    }

    /// Delete one location from several databases, best effort
    ///
    /// Used when a record is withdrawn from a source and every mapping
    /// store derived from it; individual failures are logged, not
    /// propagated, so one unreachable mapping store cannot strand the
    /// others.
    pub async fn delete_everywhere(&self, databases: &[String], id: &str) {
        for database in databases {
            if let Err(e) = self.delete(database, id).await {
                warn!(database = %database, id = %id, error = %e, "Delete failed");
            }
        }
    }

    /// Resolve the ancestor chain of a node against the registry
    ///
    /// `start` may be a bare id or a `Location/<id>` reference; the
    /// chain is leaf first and includes the starting node. The walk
    /// stops at the configured root id, which is included when
    /// reachable. Each visited node lands in the short-TTL per-node
    /// cache.
    pub async fn ancestry(
        &self,
        database: &str,
        start: &str,
        root_id: &str,
        detail: ParentDetail,
    ) -> Vec<ParentItem> {
        let mut chain = Vec::new();
        let start_id = start.rsplit('/').next().unwrap_or(start).to_string();
        if start_id.is_empty() || root_id.is_empty() {
            return chain;
        }

        let mut seen = std::collections::HashSet::new();
        let mut current = start_id.clone();

        while seen.insert(current.clone()) {
            let Some(node) = self.parent_node(database, &current).await else {
                break;
            };
            chain.push(node.item(detail));

            if current == root_id {
                break;
            }
            let Some(parent_ref) = node.parent_ref.clone() else {
                break;
            };
            let parent_id = parent_ref
                .rsplit('/')
                .next()
                .unwrap_or(parent_ref.as_str())
                .to_string();
            if parent_id == root_id {
                if let Some(root) = self.parent_node(database, root_id).await {
                    chain.push(root.item(detail));
                }
                break;
            }
            current = parent_id;
        }

        chain
    }

    async fn parent_node(&self, database: &str, id: &str) -> Option<ParentNode> {
        let key = self.location_url(database, id);
        {
            let nodes = self.parent_nodes.read().await;
            if let Some((node, inserted)) = nodes.get(&key) {
                if inserted.elapsed() < self.parent_cache_ttl {
                    return Some(node.clone());
                }
            }
        }

        let bundle = self.by_id(database, id).await;
        let location = bundle.first()?;
        let node = ParentNode {
            id: location.id.clone(),
            name: location.name.clone(),
            position: location.position,
            parent_ref: location.part_of.as_ref().map(|r| r.reference.clone()),
        };
        self.parent_nodes
            .write()
            .await
            .insert(key, (node.clone(), Instant::now()));
        Some(node)
    }

    /// Read-through fetch with single-flight protection
    ///
    /// A task observing another task's in-flight marker does not join
    /// that fetch; it sleeps the configured delay and re-checks. The
    /// marker is cleared whatever the fetch produced.
    async fn cached_fetch<F, Fut>(&self, key: &str, fetch: F) -> Bundle
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Bundle>,
    {
        loop {
            if let Some(bundle) = self.cache.get(key).await {
                return bundle;
            }
            if self.cache.begin_fetch(key).await {
                break;
            }
            debug!(
                key = %key,
                delay_ms = self.fetch_retry_delay.as_millis() as u64,
                "Fetch in progress elsewhere, will retry"
            );
            tokio::time::sleep(self.fetch_retry_delay).await;
        }

        info!(key = %key, "Fetching from registry");
        let bundle = fetch().await;
        self.cache.put(key, bundle.clone(), self.cache_ttl).await;
        self.cache.end_fetch(key).await;
        bundle
    }
}
