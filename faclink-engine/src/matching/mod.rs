//! Match/score engine
//!
//! Conflict-checked match, no-match, flag and break operations over a
//! pair's mapping store, with diagnostic comments computed at match
//! time. Every mutating operation requires the caller-supplied
//! reconciliation status to be in progress and funnels its writes
//! through the cache-invalidating store, so a match can never leave a
//! stale bundle behind in this process or its siblings.

pub mod diagnostics;

use crate::hierarchy::{ParentDetail, ParentItem};
use crate::model::{Bundle, Entry, Identifier, Location, PhysicalType, Tag};
use crate::store::LocationStore;
use faclink_common::config::Settings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Reconciliation status of one (source1, requester, source2) pair
///
/// Owned by the caller; the engine only ever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoStatus {
    #[serde(rename = "on-progress")]
    InProgress,
    #[serde(rename = "done")]
    Done,
}

impl RecoStatus {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RecoStatus::InProgress)
    }
}

/// How a match was asserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Automatic,
    Manual,
    Flag,
}

/// How a non-match was asserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoMatchKind {
    NoMatch,
    Ignore,
}

/// The databases involved in reconciling one pair for one requester
#[derive(Debug, Clone)]
pub struct ReconciliationPair {
    pub source1_db: String,
    pub source2_db: String,
    pub mapping_db: String,
}

impl ReconciliationPair {
    /// Derive the per-pair database names the way uploads create them:
    /// source databases are suffixed by their owner, the mapping store
    /// by the requesting user between the two source names.
    pub fn new(
        source1: &str,
        source1_owner: &str,
        source2: &str,
        source2_owner: &str,
        user: &str,
    ) -> Self {
        Self {
            source1_db: format!("{}{}", source1, source1_owner),
            source2_db: format!("{}{}", source2, source2_owner),
            mapping_db: format!("{}{}{}", source1, user, source2),
        }
    }
}

/// Match operation parameters
#[derive(Debug, Clone)]
pub struct MatchParams {
    pub source1_id: String,
    pub source2_id: String,
    /// Level being reconciled, 1-based
    pub level: u32,
    /// Total levels of the pair, the deepest being the building level
    pub total_levels: u32,
    pub kind: MatchKind,
    pub flag_comment: Option<String>,
}

/// Match engine errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Mutating call while the pair is not in progress
    #[error("Reconciliation closed")]
    ReconciliationClosed,

    /// One of the ids is already mapped
    #[error("{0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Registry write failed: {0}")]
    Registry(String),
}

const ALREADY_MAPPED: &str =
    "This location was already mapped, recalculate scores to update the level you are working on";

/// Conflict-checked matching over one registry
pub struct MatchEngine {
    store: Arc<LocationStore>,
    settings: Settings,
}

impl MatchEngine {
    pub fn new(store: Arc<LocationStore>, settings: Settings) -> Self {
        Self { store, settings }
    }

    /// Record a match between a source1 and a source2 location
    ///
    /// Pre-checks that neither id is already mapped, computes the
    /// diagnostic comments, writes one mapping record and returns the
    /// diagnostics.
    pub async fn save_match(
        &self,
        pair: &ReconciliationPair,
        status: RecoStatus,
        params: &MatchParams,
    ) -> Result<Vec<String>, MatchError> {
        self.ensure_open(status)?;
        let tags = &self.settings.tags;
        let root_id = &self.settings.hierarchy.root_id;

        let source1_url = self.store.location_url(&pair.source1_db, &params.source1_id);
        let source2_url = self.store.location_url(&pair.source2_db, &params.source2_id);

        let (source1_mapped, source2_mapped, source1_bundle, source1_chain, source2_chain) = tokio::join!(
            self.store.by_identifier(&pair.mapping_db, &source1_url),
            self.store.by_identifier(&pair.mapping_db, &source2_url),
            self.store.by_id(&pair.source1_db, &params.source1_id),
            self.store.ancestry(
                &pair.source1_db,
                &params.source1_id,
                root_id,
                ParentDetail::Id
            ),
            self.store.ancestry(
                &pair.source2_db,
                &params.source2_id,
                root_id,
                ParentDetail::Id
            ),
        );

        if !source1_mapped.is_empty() || !source2_mapped.is_empty() {
            error!(
                source1_id = %params.source1_id,
                source2_id = %params.source2_id,
                "Attempting to map already mapped location"
            );
            return Err(MatchError::Conflict(ALREADY_MAPPED.to_string()));
        }

        let Some(source1) = source1_bundle.first() else {
            return Err(MatchError::NotFound(format!(
                "Location {} in {}",
                params.source1_id, pair.source1_db
            )));
        };

        let source2_bundle = self.store.by_id(&pair.source2_db, &params.source2_id).await;
        let Some(source2) = source2_bundle.first() else {
            return Err(MatchError::NotFound(format!(
                "Location {} in {}",
                params.source2_id, pair.source2_db
            )));
        };

        let comments = self.diagnose(params, source1, source2, &source1_chain, &source2_chain);

        let mut record = Location::new(&params.source2_id, &source2.name);
        record.alias = Some(source1.name.clone());
        record.identifier = vec![
            Identifier {
                system: tags.source2_system.clone(),
                value: source2_url,
            },
            Identifier {
                system: tags.source1_system.clone(),
                value: source1_url,
            },
        ];
        if let Some(part_of) = &source2.part_of {
            // the synthetic root is not a real parent, never carry it over
            if !part_of.reference.contains(root_id.as_str()) {
                record.part_of = Some(part_of.clone());
            }
        }
        record.physical_type = Some(physical_type_for(params.level, params.total_levels));

        if !comments.is_empty() {
            record.tag.push(Tag {
                system: tags.source1_system.clone(),
                code: tags.match_comments_code.clone(),
                display: comments.join("; "),
            });
        }
        match params.kind {
            MatchKind::Flag => {
                if let Some(comment) = &params.flag_comment {
                    record.tag.push(Tag {
                        system: tags.source1_system.clone(),
                        code: tags.flag_comment_code.clone(),
                        display: comment.clone(),
                    });
                }
                record.tag.push(Tag {
                    system: tags.source1_system.clone(),
                    code: tags.flag_code.clone(),
                    display: "To be reviewed".to_string(),
                });
            }
            MatchKind::Automatic => record.tag.push(Tag {
                system: tags.source1_system.clone(),
                code: tags.auto_matched_code.clone(),
                display: "Automatically Matched".to_string(),
            }),
            MatchKind::Manual => record.tag.push(Tag {
                system: tags.source1_system.clone(),
                code: tags.manually_matched_code.clone(),
                display: "Manually Matched".to_string(),
            }),
        }

        self.write_one(&pair.mapping_db, record).await?;
        info!(
            source1_id = %params.source1_id,
            source2_id = %params.source2_id,
            comments = comments.len(),
            "Match saved"
        );
        Ok(comments)
    }

    /// Record that a source1 location has no counterpart, or should be
    /// ignored for this pair
    pub async fn save_no_match(
        &self,
        pair: &ReconciliationPair,
        status: RecoStatus,
        source1_id: &str,
        level: u32,
        total_levels: u32,
        kind: NoMatchKind,
    ) -> Result<(), MatchError> {
        self.ensure_open(status)?;
        let tags = &self.settings.tags;

        let source1_url = self.store.location_url(&pair.source1_db, source1_id);
        let mapped = self
            .store
            .by_identifier(&pair.mapping_db, &source1_url)
            .await;
        if !mapped.is_empty() {
            error!(
                source1_id = %source1_id,
                "Attempting to mark an already mapped location as no match"
            );
            return Err(MatchError::Conflict(ALREADY_MAPPED.to_string()));
        }

        let source1_bundle = self.store.by_id(&pair.source1_db, source1_id).await;
        let Some(source1) = source1_bundle.first() else {
            return Err(MatchError::NotFound(format!(
                "Location {} in {}",
                source1_id, pair.source1_db
            )));
        };

        let mut record = Location::new(source1_id, &source1.name);
        record.part_of = source1.part_of.clone();
        record.physical_type = Some(physical_type_for(level, total_levels));
        record.identifier = vec![Identifier {
            system: tags.source1_system.clone(),
            value: source1_url,
        }];
        record.tag = vec![match kind {
            NoMatchKind::NoMatch => Tag {
                system: tags.source1_system.clone(),
                code: tags.no_match_code.clone(),
                display: "No Match".to_string(),
            },
            NoMatchKind::Ignore => Tag {
                system: tags.source1_system.clone(),
                code: tags.ignore_code.clone(),
                display: "Ignore".to_string(),
            },
        }];

        self.write_one(&pair.mapping_db, record).await
    }

    /// Convert a flagged match into an accepted one
    ///
    /// Strips the flag and flag-comment tags and rewrites the record
    /// whole.
    pub async fn accept_flag(
        &self,
        pair: &ReconciliationPair,
        status: RecoStatus,
        source2_id: &str,
    ) -> Result<(), MatchError> {
        self.ensure_open(status)?;
        let tags = &self.settings.tags;

        let bundle = self.store.by_id(&pair.mapping_db, source2_id).await;
        let Some(flagged) = bundle.first() else {
            return Err(MatchError::NotFound(format!(
                "Mapping record {} in {}",
                source2_id, pair.mapping_db
            )));
        };

        let mut record = flagged.clone();
        record.remove_tags(&tags.flag_code);
        record.remove_tags(&tags.flag_comment_code);

        self.store
            .delete(&pair.mapping_db, source2_id)
            .await
            .map_err(|e| MatchError::Registry(e.to_string()))?;
        self.write_one(&pair.mapping_db, record).await
    }

    /// Break an existing match
    ///
    /// Deletes the mapping record, then tags the source1 record "match
    /// broken" so it resurfaces for future matching. The tag append is
    /// idempotent; a record already carrying it is left untouched.
    pub async fn break_match(
        &self,
        pair: &ReconciliationPair,
        status: RecoStatus,
        source2_id: &str,
    ) -> Result<(), MatchError> {
        self.ensure_open(status)?;
        let tags = &self.settings.tags;

        let bundle = self.store.by_id(&pair.mapping_db, source2_id).await;
        let Some(mapping) = bundle.first() else {
            return Err(MatchError::NotFound(format!(
                "Mapping record {} in {}",
                source2_id, pair.mapping_db
            )));
        };
        let mapping = mapping.clone();

        self.store
            .delete(&pair.mapping_db, source2_id)
            .await
            .map_err(|e| MatchError::Registry(e.to_string()))?;

        let Some(identifier) = mapping
            .identifier
            .iter()
            .find(|i| i.system == tags.source1_system)
        else {
            return Ok(());
        };
        let source1_id = identifier
            .value
            .rsplit('/')
            .next()
            .unwrap_or(identifier.value.as_str());

        let source1_bundle = self.store.by_id(&pair.source1_db, source1_id).await;
        if let Some(original) = source1_bundle.first() {
            if !original.has_tag(&tags.match_broken_code) {
                let mut updated = original.clone();
                updated.tag.push(Tag {
                    system: tags.source1_system.clone(),
                    code: tags.match_broken_code.clone(),
                    display: "Match Broken".to_string(),
                });
                self.write_one(&pair.source1_db, updated).await?;
            }
        }
        info!(source2_id = %source2_id, "Match broken");
        Ok(())
    }

    /// Withdraw a no-match/ignore assertion for a source1 location
    pub async fn break_no_match(
        &self,
        pair: &ReconciliationPair,
        status: RecoStatus,
        source1_id: &str,
    ) -> Result<(), MatchError> {
        self.ensure_open(status)?;
        self.store
            .delete(&pair.mapping_db, source1_id)
            .await
            .map_err(|e| MatchError::Registry(e.to_string()))
    }

    fn ensure_open(&self, status: RecoStatus) -> Result<(), MatchError> {
        if status.is_in_progress() {
            Ok(())
        } else {
            Err(MatchError::ReconciliationClosed)
        }
    }

    fn diagnose(
        &self,
        params: &MatchParams,
        source1: &Location,
        source2: &Location,
        source1_chain: &[ParentItem],
        source2_chain: &[ParentItem],
    ) -> Vec<String> {
        let mut comments = Vec::new();

        let source1_head = source1_chain.first().and_then(ParentItem::id);
        let in_source2_chain = source1_head
            .map(|head| source2_chain.iter().any(|item| item.id() == Some(head)))
            .unwrap_or(false);
        if !in_source2_chain {
            comments.push("Parents differ".to_string());
        }

        if diagnostics::names_differ(&source2.name, &source1.name) {
            comments.push("Names differ".to_string());
        }

        if params.level == params.total_levels {
            if params.source1_id != params.source2_id {
                comments.push("ID differ".to_string());
            }
            match (&source1.position, &source2.position) {
                (Some(p1), Some(p2)) => {
                    if diagnostics::geodesic_distance_m(p1, p2) != 0.0 {
                        comments.push("Coordinates differ".to_string());
                    }
                }
                _ => comments.push("Coordinates missing".to_string()),
            }
        }

        comments
    }

    async fn write_one(&self, database: &str, record: Location) -> Result<(), MatchError> {
        let mut bundle = Bundle::batch();
        bundle.entry.push(Entry::upsert(record));
        self.store
            .save(database, &bundle)
            .await
            .map_err(|e| MatchError::Registry(e.to_string()))
    }
}

fn physical_type_for(level: u32, total_levels: u32) -> PhysicalType {
    if level == total_levels {
        PhysicalType::building()
    } else {
        PhysicalType::jurisdiction()
    }
}
