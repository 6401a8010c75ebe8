//! Ingestion validation pass
//!
//! Runs over the whole file before any write. A facility code may appear
//! only once; every mapped level column and the facility name must be
//! populated on every row. Each violation records the offending field,
//! its value and a human-readable reason together with the row's mapped
//! values, and a single violation rejects the entire import.

use super::{is_blank, row_values, ColumnMapping, Row};
use serde::Serialize;
use std::collections::HashSet;
use std::io::Read;

/// One validation violation
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// The row's mapped column values
    pub row: Row,
    /// Header of the offending column
    pub field: String,
    /// Offending value as it appeared in the file
    pub value: String,
    pub reason: String,
}

/// Validate a CSV stream against a column mapping
///
/// Returns every violation found; an empty list means the file may be
/// imported.
pub fn validate<R: Read>(reader: R, mapping: &ColumnMapping) -> Result<Vec<Violation>, csv::Error> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers = csv_reader.headers()?.clone();

    let mut violations = Vec::new();
    let mut codes: HashSet<String> = HashSet::new();

    for record in csv_reader.records() {
        let record = record?;
        let row = row_values(&headers, &record);

        let code = row.get(&mapping.code).cloned().unwrap_or_default();
        if !code.is_empty() && !codes.insert(code.clone()) {
            violations.push(snapshot(&row, mapping, &mapping.code, &code, "Duplicate ID"));
        }

        for (_, header) in mapping.mapped_levels() {
            if is_blank(row.get(header)) {
                let value = row.get(header).cloned().unwrap_or_default();
                let reason = format!("{} is blank", header);
                violations.push(snapshot(&row, mapping, header, &value, &reason));
            }
        }

        if is_blank(row.get(&mapping.facility)) {
            let value = row.get(&mapping.facility).cloned().unwrap_or_default();
            let reason = format!("{} is blank", mapping.facility);
            violations.push(snapshot(&row, mapping, &mapping.facility, &value, &reason));
        }
    }

    Ok(violations)
}

fn snapshot(
    row: &Row,
    mapping: &ColumnMapping,
    field: &str,
    value: &str,
    reason: &str,
) -> Violation {
    let mapped: Row = mapping
        .headers()
        .into_iter()
        .filter_map(|h| row.get(h).map(|v| (h.to_string(), v.clone())))
        .collect();
    Violation {
        row: mapped,
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
