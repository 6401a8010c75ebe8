//! In-process mock location registry for integration tests
//!
//! Serves the query, upsert and delete surface the engine depends on
//! from an in-memory map of databases, with optional page splitting to
//! exercise pagination accumulation.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use faclink_common::config::Settings;
use faclink_engine::model::{
    Bundle, Entry, Identifier, Location, PageLink, PhysicalType, Position, Reference,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Install a test subscriber once so failures come with trace output
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine settings pointed at a mock registry, tuned for fast tests
pub fn test_settings(base_url: &str) -> Settings {
    let mut settings = Settings::default();
    settings.registry.base_url = base_url.to_string();
    settings.registry.request_timeout_secs = 5;
    settings.registry.fetch_retry_delay_ms = 10;
    settings
}

/// Jurisdiction record with provenance identifier, as ingestion writes it
pub fn jurisdiction(id: &str, name: &str, parent: Option<(&str, &str)>) -> Location {
    let mut location = Location::new(id, name);
    location.status = Some("active".to_string());
    location.mode = Some("instance".to_string());
    location.physical_type = Some(PhysicalType::jurisdiction());
    location.identifier = vec![Identifier {
        system: "https://faclink.dev/source1".to_string(),
        value: id.to_string(),
    }];
    if let Some((parent_id, parent_name)) = parent {
        location.part_of = Some(Reference::to_location(parent_id, Some(parent_name)));
    }
    location
}

/// Building record parented to a jurisdiction
pub fn building(
    id: &str,
    name: &str,
    parent: (&str, &str),
    position: Option<(f64, f64)>,
) -> Location {
    let mut location = Location::new(id, name);
    location.status = Some("active".to_string());
    location.mode = Some("instance".to_string());
    location.physical_type = Some(PhysicalType::building());
    location.part_of = Some(Reference::to_location(parent.0, Some(parent.1)));
    if let Some((latitude, longitude)) = position {
        location.position = Some(Position {
            latitude,
            longitude,
        });
    }
    location
}

#[derive(Default)]
pub struct RegistryState {
    /// database -> id -> location
    pub databases: HashMap<String, BTreeMap<String, Location>>,
    /// entries per page; whole result in one page when zero
    pub page_size: usize,
    /// filled in once the listener is bound, used for next links
    pub base_url: String,
    pub gets: usize,
    pub upserts: usize,
    pub deletes: usize,
}

#[derive(Clone, Default)]
pub struct MockRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_page_size(self, page_size: usize) -> Self {
        self.state.write().await.page_size = page_size;
        self
    }

    pub async fn seed(&self, database: &str, locations: Vec<Location>) {
        let mut state = self.state.write().await;
        let db = state.databases.entry(database.to_string()).or_default();
        for location in locations {
            db.insert(location.id.clone(), location);
        }
    }

    pub async fn location(&self, database: &str, id: &str) -> Option<Location> {
        self.state
            .read()
            .await
            .databases
            .get(database)
            .and_then(|db| db.get(id))
            .cloned()
    }

    pub async fn count(&self, database: &str) -> usize {
        self.state
            .read()
            .await
            .databases
            .get(database)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub async fn upserts(&self) -> usize {
        self.state.read().await.upserts
    }

    pub async fn gets(&self) -> usize {
        self.state.read().await.gets
    }

    /// Bind on an ephemeral port and serve until the test ends
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/:db/Location", get(query_locations))
            .route("/:db/Location/:id", delete(delete_location))
            .route("/:db/Location/:id/$hierarchy", get(hierarchy))
            .route("/:db", post(upsert))
            .with_state(self.state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock registry");
        let addr = listener.local_addr().expect("mock registry addr");
        let base_url = format!("http://{}", addr);
        self.state.write().await.base_url = base_url.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        base_url
    }
}

type Shared = Arc<RwLock<RegistryState>>;

fn bundle_of(entries: Vec<Location>) -> Bundle {
    Bundle {
        resource_type: Some("Bundle".to_string()),
        kind: Some("searchset".to_string()),
        entry: entries.into_iter().map(Entry::of).collect(),
        ..Bundle::empty()
    }
}

async fn query_locations(
    State(state): State<Shared>,
    Path(db): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Bundle> {
    state.write().await.gets += 1;
    let state = state.read().await;
    let empty = BTreeMap::new();
    let locations = state.databases.get(&db).unwrap_or(&empty);

    let mut matched: Vec<Location> = locations
        .values()
        .filter(|loc| {
            if let Some(id) = params.get("_id") {
                return &loc.id == id;
            }
            if let Some(identifier) = params.get("identifier") {
                return loc.identifier.iter().any(|i| &i.value == identifier);
            }
            if let Some(parent) = params.get("partof") {
                return loc
                    .part_of
                    .as_ref()
                    .map(|p| p.reference.ends_with(parent.rsplit('/').next().unwrap_or(parent)))
                    .unwrap_or(false);
            }
            true
        })
        .cloned()
        .collect();

    // page splitting to exercise the client's next-link following
    if state.page_size > 0 && matched.len() > state.page_size {
        let total = matched.len();
        let page: usize = params
            .get("_page")
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        let start = page * state.page_size;
        let slice: Vec<Location> = matched
            .drain(..)
            .skip(start)
            .take(state.page_size)
            .collect();
        let mut bundle = bundle_of(slice);
        if (page + 1) * state.page_size < total {
            let mut next_params: Vec<String> = params
                .iter()
                .filter(|(k, _)| k.as_str() != "_page")
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            next_params.push(format!("_page={}", page + 1));
            bundle.link.push(PageLink {
                relation: "next".to_string(),
                url: format!(
                    "{}/{}/Location?{}",
                    state.base_url,
                    db,
                    next_params.join("&")
                ),
            });
        }
        return Json(bundle);
    }

    Json(bundle_of(matched))
}

async fn hierarchy(
    State(state): State<Shared>,
    Path((db, _root)): Path<(String, String)>,
) -> Json<Bundle> {
    let state = state.read().await;
    let entries = state
        .databases
        .get(&db)
        .map(|locations| locations.values().cloned().collect())
        .unwrap_or_default();
    Json(bundle_of(entries))
}

async fn upsert(
    State(state): State<Shared>,
    Path(db): Path<String>,
    Json(bundle): Json<Bundle>,
) -> Json<serde_json::Value> {
    let mut state = state.write().await;
    state.upserts += 1;
    let locations = state.databases.entry(db).or_default();
    for entry in bundle.entry {
        locations.insert(entry.resource.id.clone(), entry.resource);
    }
    Json(serde_json::json!({"status": "ok"}))
}

async fn delete_location(
    State(state): State<Shared>,
    Path((db, id)): Path<(String, String)>,
) -> Json<serde_json::Value> {
    let mut state = state.write().await;
    state.deletes += 1;
    if let Some(locations) = state.databases.get_mut(&db) {
        locations.remove(&id);
    }
    Json(serde_json::json!({"status": "ok"}))
}
