//! Location registry data model
//!
//! Wire types exchanged with the remote location registry. A query
//! returns a [`Bundle`] of entries, each wrapping one [`Location`];
//! upsert submissions reuse the same bundle shape with per-entry batch
//! requests. Field names mirror the registry's JSON.

use serde::{Deserialize, Serialize};

/// Physical-type code for administrative areas
pub const JURISDICTION_CODE: &str = "jdn";
/// Physical-type code for facilities
pub const BUILDING_CODE: &str = "bu";
/// Coding system for physical types
pub const PHYSICAL_TYPE_SYSTEM: &str = "http://hl7.org/fhir/location-physical-type";

/// Geographic position of a location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Reference to another location, `Location/<id>` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    pub reference: String,
}

impl Reference {
    pub fn to_location(id: &str, display: Option<&str>) -> Self {
        Self {
            display: display.map(str::to_string),
            reference: format!("Location/{}", id),
        }
    }

    /// Trailing path segment of the reference, the referenced id
    pub fn id(&self) -> &str {
        self.reference.rsplit('/').next().unwrap_or(&self.reference)
    }
}

/// One coding within a physical type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coding {
    pub code: String,
    pub display: String,
    pub system: String,
}

/// Physical-type classification of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalType {
    pub coding: Vec<Coding>,
}

impl PhysicalType {
    pub fn jurisdiction() -> Self {
        Self {
            coding: vec![Coding {
                code: JURISDICTION_CODE.to_string(),
                display: "Jurisdiction".to_string(),
                system: PHYSICAL_TYPE_SYSTEM.to_string(),
            }],
        }
    }

    pub fn building() -> Self {
        Self {
            coding: vec![Coding {
                code: BUILDING_CODE.to_string(),
                display: "Building".to_string(),
                system: PHYSICAL_TYPE_SYSTEM.to_string(),
            }],
        }
    }

    pub fn is_building(&self) -> bool {
        self.coding.iter().any(|c| c.code == BUILDING_CODE)
    }
}

/// Provenance identifier tying a record back to an originating source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

/// Classification tag attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub system: String,
    pub code: String,
    pub display: String,
}

/// One location record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default = "location_resource_type")]
    pub resource_type: String,
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_type: Option<PhysicalType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Tag>,
}

fn location_resource_type() -> String {
    "Location".to_string()
}

impl Location {
    /// Minimal record with the given id and name
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: location_resource_type(),
            id: id.into(),
            name: name.into(),
            alias: None,
            status: None,
            mode: None,
            identifier: Vec::new(),
            part_of: None,
            physical_type: None,
            position: None,
            tag: Vec::new(),
        }
    }

    /// Id of the immediate parent, if any
    pub fn parent_id(&self) -> Option<&str> {
        self.part_of.as_ref().map(|r| r.id())
    }

    pub fn is_building(&self) -> bool {
        self.physical_type
            .as_ref()
            .map(PhysicalType::is_building)
            .unwrap_or(false)
    }

    pub fn has_tag(&self, code: &str) -> bool {
        self.tag.iter().any(|t| t.code == code)
    }

    /// Drop every tag carrying the given code
    pub fn remove_tags(&mut self, code: &str) {
        self.tag.retain(|t| t.code != code);
    }
}

/// Batch request attached to an upsert entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub method: String,
    pub url: String,
}

/// One bundle entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub resource: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BatchRequest>,
}

impl Entry {
    /// Plain read entry
    pub fn of(resource: Location) -> Self {
        Self {
            resource,
            request: None,
        }
    }

    /// Upsert entry, written with PUT keyed by the resource id
    pub fn upsert(resource: Location) -> Self {
        let url = format!("Location/{}", resource.id);
        Self {
            resource,
            request: Some(BatchRequest {
                method: "PUT".to_string(),
                url,
            }),
        }
    }
}

/// Pagination link on a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub relation: String,
    pub url: String,
}

/// An unordered collection of locations returned by one logical query,
/// possibly accumulated across several pages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<PageLink>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

impl Bundle {
    /// Empty result bundle
    pub fn empty() -> Self {
        Self::default()
    }

    /// Batch upsert bundle with a fresh id
    pub fn batch() -> Self {
        Self {
            resource_type: Some("Bundle".to_string()),
            id: Some(faclink_common::ids::bundle_id().to_string()),
            kind: Some("batch".to_string()),
            link: Vec::new(),
            entry: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_empty()
    }

    /// First entry's resource, where callers expect a by-id singleton
    pub fn first(&self) -> Option<&Location> {
        self.entry.first().map(|e| &e.resource)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Entry> {
        self.entry.iter().find(|e| e.resource.id == id)
    }

    /// URL of the `next` pagination link, if present
    pub fn next_url(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url.as_str())
    }
}
