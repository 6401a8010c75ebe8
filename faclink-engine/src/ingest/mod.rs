//! CSV ingestion engine
//!
//! Turns caller-mapped tabular files into location hierarchies: a
//! validation pass that must succeed before anything is written, then a
//! streaming import pass that derives stable jurisdiction ids from row
//! content and commits records in batched upserts with progress
//! reporting.

pub mod import;
pub mod validate;

use std::collections::BTreeMap;
use thiserror::Error;

pub use import::{CsvImporter, ImportReport};
pub use validate::{validate, Violation};

/// Caller-supplied mapping from engine fields to CSV headers
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    /// One slot per configured hierarchy level, most general first;
    /// `None` for levels absent from this file
    pub levels: Vec<Option<String>>,
    /// Facility name column
    pub facility: String,
    /// Facility code column, the building's externally supplied id
    pub code: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

impl ColumnMapping {
    /// Mapped level columns as (1-based depth, header), most general first
    pub fn mapped_levels(&self) -> impl Iterator<Item = (u32, &str)> {
        self.levels
            .iter()
            .enumerate()
            .filter_map(|(i, header)| header.as_deref().map(|h| (i as u32 + 1, h)))
    }

    /// Every mapped header, for violation row snapshots
    pub fn headers(&self) -> Vec<&str> {
        let mut headers: Vec<&str> = self.mapped_levels().map(|(_, h)| h).collect();
        headers.push(self.facility.as_str());
        headers.push(self.code.as_str());
        if let Some(h) = self.latitude.as_deref() {
            headers.push(h);
        }
        if let Some(h) = self.longitude.as_deref() {
            headers.push(h);
        }
        headers
    }
}

/// Ingestion errors
#[derive(Debug, Error)]
pub enum ImportError {
    /// The file failed validation; nothing was written
    #[error("CSV validation failed with {} violation(s)", .0.len())]
    Invalid(Vec<Violation>),

    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry write failed: {0}")]
    Registry(String),
}

/// Values of one row keyed by CSV header
pub(crate) type Row = BTreeMap<String, String>;

pub(crate) fn row_values(headers: &csv::StringRecord, record: &csv::StringRecord) -> Row {
    headers
        .iter()
        .zip(record.iter())
        .map(|(h, v)| (h.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn is_blank(value: Option<&String>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}
