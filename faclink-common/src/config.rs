//! Configuration loading and resolution
//!
//! Settings resolve in priority order: compiled defaults, then the TOML
//! config file, then environment variables. The registry URL is the only
//! value commonly overridden per deployment; everything else ships with
//! workable defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Environment variable overriding the registry base URL
pub const REGISTRY_URL_ENV: &str = "FACLINK_REGISTRY_URL";

/// Remote location registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Base URL of the location registry, e.g. `http://localhost:3447`
    pub base_url: String,
    /// Page size hint appended to whole-collection queries
    pub page_count_hint: u32,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// TTL for cached collection bundles, in milliseconds
    pub cache_ttl_ms: u64,
    /// TTL for per-node parent-chain entries, in milliseconds
    pub parent_cache_ttl_ms: u64,
    /// Delay before re-checking a key with a fetch in flight, in milliseconds
    pub fetch_retry_delay_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3447".to_string(),
            page_count_hint: 37_000,
            request_timeout_secs: 30,
            cache_ttl_ms: 20 * 60 * 1000,
            parent_cache_ttl_ms: 120 * 1000,
            fetch_retry_delay_ms: 10_000,
        }
    }
}

/// Hierarchy shape settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySettings {
    /// Id of the synthetic root wrapping each dataset
    pub root_id: String,
    /// Display name of the synthetic root
    pub root_name: String,
    /// Ordered jurisdiction level column names, most general first
    pub levels: Vec<String>,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            root_id: "53c0a407-8a77-4b04-8cf8-e2b220c5bd23".to_string(),
            root_name: "Dataset root".to_string(),
            levels: vec![
                "level1".to_string(),
                "level2".to_string(),
                "level3".to_string(),
                "level4".to_string(),
            ],
        }
    }
}

/// Identity derivation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Namespace seed for content-derived ids; combined with the depth
    /// index so equal names at different levels stay distinct
    pub namespace: Uuid,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            namespace: Uuid::from_u128(0xb9b3_7f5c_2c1e_4a6f_9d4e_1f2a_3b4c_5d6e),
        }
    }
}

/// Classification tag systems and codes attached to mapping records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    /// Identifier/tag system URI for source1 provenance
    pub source1_system: String,
    /// Identifier/tag system URI for source2 provenance
    pub source2_system: String,
    pub flag_code: String,
    pub flag_comment_code: String,
    pub auto_matched_code: String,
    pub manually_matched_code: String,
    pub no_match_code: String,
    pub ignore_code: String,
    pub match_broken_code: String,
    pub match_comments_code: String,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            source1_system: "https://faclink.dev/source1".to_string(),
            source2_system: "https://faclink.dev/source2".to_string(),
            flag_code: "flagged".to_string(),
            flag_comment_code: "flag-comment".to_string(),
            auto_matched_code: "auto-matched".to_string(),
            manually_matched_code: "manually-matched".to_string(),
            no_match_code: "no-match".to_string(),
            ignore_code: "ignored".to_string(),
            match_broken_code: "match-broken".to_string(),
            match_comments_code: "match-comments".to_string(),
        }
    }
}

/// CSV ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    /// Records per upsert bundle before a flush is forced
    pub batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self { batch_size: 250 }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub hierarchy: HierarchySettings,
    pub identity: IdentitySettings,
    pub tags: TagSettings,
    pub import: ImportSettings,
}

impl Settings {
    /// Load settings: defaults, overlaid by the TOML file (explicit path,
    /// or the platform config location), overlaid by environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path.map(PathBuf::from).or_else(default_config_path) {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                let parsed: Settings = toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse {} failed: {}", p.display(), e)))?;
                info!("Settings loaded from {}", p.display());
                parsed
            }
            _ => Settings::default(),
        };

        if let Ok(url) = std::env::var(REGISTRY_URL_ENV) {
            if !url.trim().is_empty() {
                info!("Registry URL taken from {}", REGISTRY_URL_ENV);
                settings.registry.base_url = url;
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.hierarchy.levels.is_empty() {
            return Err(Error::Config("hierarchy.levels must not be empty".to_string()));
        }
        if self.hierarchy.root_id.trim().is_empty() {
            return Err(Error::Config("hierarchy.root_id must not be empty".to_string()));
        }
        if self.import.batch_size == 0 {
            return Err(Error::Config("import.batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Platform config file path, `~/.config/faclink/config.toml` on Linux
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("faclink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.import.batch_size, 250);
        assert_eq!(settings.registry.parent_cache_ttl_ms, 120_000);
    }

    #[test]
    fn toml_overlay_keeps_unset_defaults() {
        let parsed: Settings = toml::from_str(
            r#"
            [registry]
            base_url = "http://registry:8080"

            [hierarchy]
            levels = ["region", "district"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.registry.base_url, "http://registry:8080");
        assert_eq!(parsed.registry.fetch_retry_delay_ms, 10_000);
        assert_eq!(parsed.hierarchy.levels, vec!["region", "district"]);
        assert_eq!(parsed.import.batch_size, 250);
    }

    #[test]
    fn empty_levels_rejected() {
        let mut settings = Settings::default();
        settings.hierarchy.levels.clear();
        assert!(settings.validate().is_err());
    }
}
