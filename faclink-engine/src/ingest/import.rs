//! Streaming CSV import
//!
//! Each row contributes its populated jurisdiction levels and one
//! building. Jurisdiction ids are derived from content so that the same
//! logical node always receives the same id, across rows and across
//! re-imports; a run-scoped seen-set keeps each derived id from being
//! written twice in one run. Records accumulate into an upsert bundle
//! that is flushed at the configured batch size, with the remainder
//! flushed at end of stream; a progress snapshot is pushed after every
//! flush and completion is signaled only once the final flush has
//! confirmed.

use super::{is_blank, row_values, validate, ColumnMapping, ImportError, Row};
use crate::model::{Bundle, Entry, Identifier, Location, PhysicalType, Position, Reference};
use crate::store::LocationStore;
use faclink_common::config::Settings;
use faclink_common::events::{ProgressBoard, ProgressSnapshot};
use faclink_common::ids;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

const STATUS_VALIDATING: &str = "2/3 Validating uploaded data";
const STATUS_WRITING: &str = "3/3 Writing uploaded data into registry";
const STATUS_DONE: &str = "Done";

/// Summary of one completed import run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    /// Data rows read from the file
    pub rows: usize,
    /// Rows skipped for a blank facility cell
    pub skipped: usize,
    /// Distinct jurisdiction nodes written
    pub jurisdictions: usize,
    /// Buildings written
    pub buildings: usize,
    /// Upsert bundles submitted
    pub flushes: usize,
}

/// CSV-to-hierarchy importer for one registry database
pub struct CsvImporter {
    store: Arc<LocationStore>,
    settings: Settings,
    progress: ProgressBoard,
}

impl CsvImporter {
    pub fn new(store: Arc<LocationStore>, settings: Settings, progress: ProgressBoard) -> Self {
        Self {
            store,
            settings,
            progress,
        }
    }

    /// Validate and import a CSV file
    ///
    /// The validation pass runs over the whole file first; any violation
    /// rejects the import with nothing written.
    pub async fn import_file(
        &self,
        path: &Path,
        mapping: &ColumnMapping,
        database: &str,
        correlation_id: &str,
    ) -> Result<ImportReport, ImportError> {
        self.progress
            .set(correlation_id, ProgressSnapshot::status(STATUS_VALIDATING))
            .await;

        let violations = validate(std::fs::File::open(path)?, mapping)?;
        if !violations.is_empty() {
            error!(
                violations = violations.len(),
                "Uploaded file is invalid, execution stopped"
            );
            self.progress
                .set(correlation_id, ProgressSnapshot::failed("Uploaded file is invalid"))
                .await;
            return Err(ImportError::Invalid(violations));
        }

        self.progress
            .set(correlation_id, ProgressSnapshot::status(STATUS_WRITING))
            .await;
        self.import_stream(std::fs::File::open(path)?, mapping, database, correlation_id)
            .await
    }

    /// Import an already validated CSV stream
    ///
    /// Callers are expected to have run [`validate`] first; rows whose
    /// facility cell is blank anyway are skipped with a log line and the
    /// progress still advances past them.
    pub async fn import_stream<R: Read>(
        &self,
        reader: R,
        mapping: &ColumnMapping,
        database: &str,
        correlation_id: &str,
    ) -> Result<ImportReport, ImportError> {
        let root_id = self.settings.hierarchy.root_id.clone();
        let root_name = self.settings.hierarchy.root_name.clone();
        let batch_size = self.settings.import.batch_size;

        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let mut report = ImportReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut bundle = Bundle::batch();
        let mut enqueued = 0usize;
        let mut written = 0usize;

        for record in csv_reader.records() {
            let record = record?;
            let row = row_values(&headers, &record);
            report.rows += 1;

            if is_blank(row.get(&mapping.facility)) {
                report.skipped += 1;
                info!(row = report.rows, "Skipped row with blank facility");
                continue;
            }

            let nodes = self.derive_jurisdictions(&row, mapping, &root_id, &root_name);
            let mut facility_parent: Option<(String, String)> = None;
            for node in nodes {
                if facility_parent.is_none() {
                    facility_parent = Some((node.name.clone(), node.id.clone()));
                }
                if seen.insert(node.id.clone()) {
                    bundle.entry.push(Entry::upsert(self.jurisdiction_record(&node)));
                    report.jurisdictions += 1;
                    enqueued += 1;
                }
            }

            // the synthetic root is written once per run so every chain
            // terminates at a real record
            if seen.insert(root_id.clone()) {
                bundle.entry.push(Entry::upsert(self.jurisdiction_record(&JurisdictionNode {
                    id: root_id.clone(),
                    name: root_name.clone(),
                    parent: None,
                })));
                report.jurisdictions += 1;
                enqueued += 1;
            }

            let (parent_name, parent_id) = facility_parent
                .unwrap_or_else(|| (root_name.clone(), root_id.clone()));
            bundle
                .entry
                .push(Entry::upsert(self.building_record(&row, mapping, &parent_name, &parent_id)));
            report.buildings += 1;
            enqueued += 1;

            if bundle.entry.len() >= batch_size {
                let full = std::mem::replace(&mut bundle, Bundle::batch());
                written = self
                    .flush(database, full, written, enqueued, correlation_id)
                    .await?;
                report.flushes += 1;
            }
        }

        if !bundle.is_empty() {
            written = self
                .flush(database, bundle, written, enqueued, correlation_id)
                .await?;
            report.flushes += 1;
        }

        self.progress
            .set(
                correlation_id,
                ProgressSnapshot::percent(STATUS_DONE, 100.0),
            )
            .await;
        info!(
            database = %database,
            rows = report.rows,
            jurisdictions = report.jurisdictions,
            buildings = report.buildings,
            written,
            "Import complete"
        );
        Ok(report)
    }

    /// Populated jurisdiction nodes of one row, most specific first
    fn derive_jurisdictions(
        &self,
        row: &Row,
        mapping: &ColumnMapping,
        root_id: &str,
        root_name: &str,
    ) -> Vec<JurisdictionNode> {
        let namespace = self.settings.identity.namespace;
        let mapped: Vec<(u32, &str)> = mapping.mapped_levels().collect();
        let mut nodes = Vec::new();

        for &(depth, header) in mapped.iter().rev() {
            if is_blank(row.get(header)) {
                continue;
            }
            let name = row.get(header).map(|v| v.trim()).unwrap_or_default();

            // ancestor level values above this node, most specific first
            let ancestors: Vec<&str> = mapped
                .iter()
                .filter(|&&(d, _)| d < depth)
                .rev()
                .map(|&(_, h)| row.get(h).map(String::as_str).unwrap_or_default())
                .collect();
            let id = ids::jurisdiction_id(&namespace, depth, name, &ancestors).to_string();

            // nearest populated shallower level is the parent; the
            // synthetic root otherwise
            let parent = mapped
                .iter()
                .filter(|&&(d, h)| d < depth && !is_blank(row.get(h)))
                .next_back()
                .map(|&(d, h)| {
                    let parent_name = row.get(h).map(|v| v.trim()).unwrap_or_default();
                    let grand_ancestors: Vec<&str> = mapped
                        .iter()
                        .filter(|&&(gd, _)| gd < d)
                        .rev()
                        .map(|&(_, gh)| row.get(gh).map(String::as_str).unwrap_or_default())
                        .collect();
                    (
                        parent_name.to_string(),
                        ids::jurisdiction_id(&namespace, d, parent_name, &grand_ancestors)
                            .to_string(),
                    )
                })
                .unwrap_or_else(|| (root_name.to_string(), root_id.to_string()));

            nodes.push(JurisdictionNode {
                id,
                name: name.to_string(),
                parent: Some(parent),
            });
        }

        nodes
    }

    fn jurisdiction_record(&self, node: &JurisdictionNode) -> Location {
        let mut location = Location::new(&node.id, &node.name);
        location.status = Some("active".to_string());
        location.mode = Some("instance".to_string());
        location.identifier = vec![Identifier {
            system: self.settings.tags.source1_system.clone(),
            value: node.id.clone(),
        }];
        if let Some((parent_name, parent_id)) = &node.parent {
            location.part_of = Some(Reference::to_location(parent_id, Some(parent_name)));
        }
        location.physical_type = Some(PhysicalType::jurisdiction());
        location
    }

    fn building_record(
        &self,
        row: &Row,
        mapping: &ColumnMapping,
        parent_name: &str,
        parent_id: &str,
    ) -> Location {
        let code = row
            .get(&mapping.code)
            .map(|v| v.trim())
            .unwrap_or_default();
        let name = row
            .get(&mapping.facility)
            .map(|v| v.trim())
            .unwrap_or_default();

        let mut location = Location::new(code, name);
        location.status = Some("active".to_string());
        location.mode = Some("instance".to_string());
        location.identifier = vec![Identifier {
            system: self.settings.tags.source1_system.clone(),
            value: code.to_string(),
        }];
        location.part_of = Some(Reference::to_location(parent_id, Some(parent_name)));
        location.physical_type = Some(PhysicalType::building());

        let latitude = mapping
            .latitude
            .as_ref()
            .and_then(|h| row.get(h))
            .and_then(|v| v.trim().parse::<f64>().ok());
        let longitude = mapping
            .longitude
            .as_ref()
            .and_then(|h| row.get(h))
            .and_then(|v| v.trim().parse::<f64>().ok());
        if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
            location.position = Some(Position {
                latitude,
                longitude,
            });
        }
        location
    }

    async fn flush(
        &self,
        database: &str,
        bundle: Bundle,
        written_before: usize,
        enqueued: usize,
        correlation_id: &str,
    ) -> Result<usize, ImportError> {
        let count = bundle.entry.len();
        if let Err(e) = self.store.save(database, &bundle).await {
            self.progress
                .set(correlation_id, ProgressSnapshot::failed(e.to_string()))
                .await;
            return Err(ImportError::Registry(e.to_string()));
        }

        let written = written_before + count;
        let percent = ((written as f64 * 100.0 / enqueued as f64) * 100.0).round() / 100.0;
        self.progress
            .set(
                correlation_id,
                ProgressSnapshot::percent(STATUS_WRITING, percent),
            )
            .await;
        Ok(written)
    }
}

struct JurisdictionNode {
    id: String,
    name: String,
    /// (name, id) of the immediate parent; `None` only for the
    /// synthetic root itself
    parent: Option<(String, String)>,
}
