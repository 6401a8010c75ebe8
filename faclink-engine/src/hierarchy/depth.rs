//! Depth counting
//!
//! Probes how deep a source hierarchy goes by repeatedly asking the
//! registry for children, descending into the first child returned at
//! each step. Siblings of the probed child are buffered; when a branch
//! dead-ends early the probe resumes from a buffered sibling instead of
//! terminating, and a warning is logged because branches of unequal
//! depth make the count an approximation.

use crate::store::LocationStore;
use std::collections::VecDeque;
use tracing::warn;

/// Count hierarchy levels under a root, the root's own level included
pub async fn count_levels(store: &LocationStore, database: &str, root_id: &str) -> u32 {
    let mut total = 1u32;
    let mut siblings: VecDeque<String> = VecDeque::new();
    let mut current = root_id.to_string();

    loop {
        let children = store.children(database, &current).await;
        if children.is_empty() {
            match siblings.pop_front() {
                Some(next) => {
                    warn!(
                        database = %database,
                        dead_end = %current,
                        "Branch ended above the probed depth, resuming from a sibling; level count may be approximate"
                    );
                    current = next;
                }
                None => return total,
            }
        } else {
            let mut ids: VecDeque<String> = children
                .entry
                .iter()
                .map(|e| e.resource.id.clone())
                .collect();
            if let Some(first) = ids.pop_front() {
                // descend into the first-returned child
                total += 1;
                current = first;
                siblings = ids;
            }
        }
    }
}
