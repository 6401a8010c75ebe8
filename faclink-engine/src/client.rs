//! Remote location registry client
//!
//! Thin HTTP client over the registry's paged query API. Reads accumulate
//! entries across pages by following the `next` pagination link; page N+1
//! is requested only after page N has been parsed. Transport and parse
//! failures on reads degrade to an empty (or partially accumulated)
//! bundle — a traversal never dies because one remote response was bad,
//! at the cost that callers cannot tell "no data" from "fetch failed".
//! Writes surface their errors; a swallowed write would corrupt the
//! reconciliation state silently.
//!
//! No caching happens here; the cache-coherent read path lives in
//! [`crate::store`].

use crate::model::Bundle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("faclink/", env!("CARGO_PKG_VERSION"));

/// Registry client errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Registry returned status {0}: {1}")]
    Status(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// HTTP client for one remote location registry
#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
    page_count_hint: u32,
}

impl RegistryClient {
    pub fn new(base_url: &str, request_timeout_secs: u64, page_count_hint: u32) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_count_hint,
        })
    }

    /// Location collection URL for a database; doubles as the canonical
    /// cache-key prefix for everything queried under that collection
    pub fn collection_url(&self, database: &str) -> String {
        format!("{}/{}/Location", self.base_url, database)
    }

    /// Fetch every location in a database
    pub async fn fetch_all(&self, database: &str) -> Bundle {
        let url = format!(
            "{}?_count={}",
            self.collection_url(database),
            self.page_count_hint
        );
        self.fetch_paged(&url).await
    }

    /// Fetch a location by id
    pub async fn fetch_by_id(&self, database: &str, id: &str) -> Bundle {
        let url = format!("{}?_id={}", self.collection_url(database), id);
        self.fetch_paged(&url).await
    }

    /// Fetch locations carrying the given provenance identifier value
    pub async fn fetch_by_identifier(&self, database: &str, identifier: &str) -> Bundle {
        if identifier.is_empty() {
            return Bundle::empty();
        }
        let url = format!(
            "{}?identifier={}",
            self.collection_url(database),
            identifier
        );
        self.fetch_paged(&url).await
    }

    /// Fetch the direct children of a location
    pub async fn fetch_children(&self, database: &str, parent_id: &str) -> Bundle {
        let url = format!(
            "{}?partof=Location/{}",
            self.collection_url(database),
            parent_id
        );
        self.fetch_paged(&url).await
    }

    /// Fetch the whole hierarchy under a root in one query
    pub async fn fetch_hierarchy(&self, database: &str, root_id: &str) -> Bundle {
        let url = format!("{}/{}/$hierarchy", self.collection_url(database), root_id);
        match self.get_bundle(&url).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(url = %url, error = %e, "Hierarchy fetch failed, returning empty bundle");
                Bundle::empty()
            }
        }
    }

    /// Accumulate entries across pages until no `next` link remains
    pub async fn fetch_paged(&self, url: &str) -> Bundle {
        let mut accumulated = Bundle::empty();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            match self.get_bundle(&page_url).await {
                Ok(page) => {
                    next = page.next_url().map(str::to_string);
                    accumulated.entry.extend(page.entry);
                }
                Err(e) => {
                    warn!(url = %page_url, error = %e, "Page fetch failed, stopping accumulation");
                    break;
                }
            }
        }

        accumulated
    }

    /// Submit an upsert bundle for a database
    pub async fn upsert(&self, database: &str, bundle: &Bundle) -> Result<(), RegistryError> {
        let url = format!("{}/{}", self.base_url, database);
        debug!(url = %url, entries = bundle.len(), "Submitting upsert bundle");

        let response = self
            .http
            .post(&url)
            .json(bundle)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status(status.as_u16(), body));
        }
        Ok(())
    }

    /// Delete one location by id
    pub async fn delete(&self, database: &str, id: &str) -> Result<(), RegistryError> {
        let url = format!("{}/{}", self.collection_url(database), id);
        debug!(url = %url, "Deleting location");

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status(status.as_u16(), body));
        }
        Ok(())
    }

    async fn get_bundle(&self, url: &str) -> Result<Bundle, RegistryError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::Status(status.as_u16(), body));
        }

        response
            .json::<Bundle>()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = RegistryClient::new("http://localhost:3447/", 30, 37_000);
        assert!(client.is_ok());
    }

    #[test]
    fn collection_url_strips_trailing_slash() {
        let client = RegistryClient::new("http://registry:8080/", 30, 100).unwrap();
        assert_eq!(
            client.collection_url("Source1abc"),
            "http://registry:8080/Source1abc/Location"
        );
    }

    #[tokio::test]
    async fn empty_identifier_short_circuits() {
        let client = RegistryClient::new("http://localhost:1", 1, 100).unwrap();
        let bundle = client.fetch_by_identifier("db", "").await;
        assert!(bundle.is_empty());
    }

    #[tokio::test]
    async fn unreachable_registry_degrades_to_empty() {
        // Port 1 refuses connections; the read path must absorb that.
        let client = RegistryClient::new("http://127.0.0.1:1", 1, 100).unwrap();
        let bundle = client.fetch_all("db").await;
        assert!(bundle.is_empty());
    }
}
