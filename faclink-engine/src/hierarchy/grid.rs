//! Grid projection
//!
//! Flattens every building of a bundle into one row per facility with
//! its ancestor chain spread over per-level columns, optionally
//! constrained to buildings under a given ancestor. Unconstrained
//! requests are windowed by offset/limit; a constrained request returns
//! the whole filtered set from offset zero, with the pre-pagination
//! total alongside either way.

use crate::hierarchy::parents::{ChainResolver, ParentDetail, ParentItem};
use crate::model::Bundle;
use serde::Serialize;

/// One ancestor column of a grid row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub name: String,
    pub id: String,
}

/// One facility row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRow {
    pub facility: String,
    pub id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Ancestor columns, most general first
    pub levels: Vec<GridCell>,
}

/// A page of grid rows plus the total number of matching buildings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridPage {
    pub rows: Vec<GridRow>,
    pub total: usize,
}

/// Project the buildings of `bundle` into grid rows
///
/// `ancestor_id` equal to `root_id` means no constraint. Buildings whose
/// chain does not contain a requested ancestor are excluded from rows
/// and total alike.
pub fn build_grid(
    bundle: &Bundle,
    ancestor_id: &str,
    root_id: &str,
    offset: usize,
    limit: usize,
) -> GridPage {
    let constrained = ancestor_id != root_id;
    let mut resolver = ChainResolver::new(bundle);
    let mut rows = Vec::new();
    let mut total = 0usize;

    for entry in &bundle.entry {
        if !entry.resource.is_building() {
            continue;
        }
        let resource = &entry.resource;

        let chain = match &resource.part_of {
            Some(part_of) => resolver.resolve(&part_of.reference, ParentDetail::Full),
            None => Vec::new(),
        };

        if constrained {
            if resource.part_of.is_none() {
                // a parentless building can never satisfy an ancestor
                // constraint; it still counts toward the total
                total += 1;
                continue;
            }
            let found = chain.iter().any(|item| item.id() == Some(ancestor_id));
            if !found {
                continue;
            }
        }

        let mut levels: Vec<GridCell> = chain
            .iter()
            .filter_map(|item| match item {
                ParentItem::Full(summary) => Some(GridCell {
                    name: summary.name.clone(),
                    id: summary.id.clone(),
                }),
                _ => None,
            })
            .collect();
        levels.reverse();

        total += 1;
        if !constrained {
            if total <= offset {
                continue;
            }
            if rows.len() >= limit {
                continue;
            }
        }
        rows.push(GridRow {
            facility: resource.name.clone(),
            id: resource.id.clone(),
            latitude: resource.position.as_ref().map(|p| p.latitude),
            longitude: resource.position.as_ref().map(|p| p.longitude),
            levels,
        });
    }

    GridPage { rows, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Location, PhysicalType, Position, Reference};

    fn jurisdiction(id: &str, name: &str, parent: Option<&str>) -> Entry {
        let mut loc = Location::new(id, name);
        loc.physical_type = Some(PhysicalType::jurisdiction());
        loc.part_of = parent.map(|p| Reference::to_location(p, None));
        Entry::of(loc)
    }

    fn facility(id: &str, name: &str, parent: &str, lat: f64, long: f64) -> Entry {
        let mut loc = Location::new(id, name);
        loc.physical_type = Some(PhysicalType::building());
        loc.part_of = Some(Reference::to_location(parent, None));
        loc.position = Some(Position {
            latitude: lat,
            longitude: long,
        });
        Entry::of(loc)
    }

    fn sample() -> Bundle {
        Bundle {
            entry: vec![
                jurisdiction("root", "Dataset root", None),
                jurisdiction("ke", "Kenya", Some("root")),
                jurisdiction("nbo", "Nairobi", Some("ke")),
                jurisdiction("msa", "Mombasa", Some("ke")),
                facility("c1", "Clinic A", "nbo", -1.3, 36.8),
                facility("c2", "Clinic B", "nbo", -1.28, 36.82),
                facility("c3", "Coast Clinic", "msa", -4.05, 39.67),
            ],
            ..Bundle::empty()
        }
    }

    #[test]
    fn rows_carry_flattened_ancestors() {
        let bundle = sample();
        let page = build_grid(&bundle, "root", "root", 0, 100);
        assert_eq!(page.total, 3);
        let row = page.rows.iter().find(|r| r.id == "c1").unwrap();
        assert_eq!(row.facility, "Clinic A");
        assert_eq!(row.latitude, Some(-1.3));
        let names: Vec<_> = row.levels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Dataset root", "Kenya", "Nairobi"]);
    }

    #[test]
    fn ancestor_constraint_filters_and_ignores_window() {
        let bundle = sample();
        let page = build_grid(&bundle, "nbo", "root", 5, 1);
        assert_eq!(page.total, 2);
        let ids: Vec<_> = page.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[test]
    fn unconstrained_request_is_windowed_with_full_total() {
        let bundle = sample();
        let page = build_grid(&bundle, "root", "root", 1, 1);
        assert_eq!(page.total, 3);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].id, "c2");
    }

    #[test]
    fn parentless_building_counts_but_never_matches_a_constraint() {
        let mut bundle = sample();
        let mut stray = Location::new("c9", "Floating Clinic");
        stray.physical_type = Some(PhysicalType::building());
        bundle.entry.push(Entry::of(stray));

        let constrained = build_grid(&bundle, "nbo", "root", 0, 100);
        assert_eq!(constrained.total, 3);
        assert!(constrained.rows.iter().all(|r| r.id != "c9"));

        let open = build_grid(&bundle, "root", "root", 0, 100);
        assert_eq!(open.total, 4);
        let stray_row = open.rows.iter().find(|r| r.id == "c9").unwrap();
        assert!(stray_row.levels.is_empty());
    }
}
