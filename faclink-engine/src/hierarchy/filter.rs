//! Level filtering
//!
//! Extracts every node sitting at one hierarchy level below a root.
//! Level 1 is the root itself; level N is reached by expanding the
//! frontier N-1 times. All nodes on the current frontier expand
//! concurrently; the next level starts only once the whole frontier has
//! expanded, so levels never interleave.

use crate::model::{Bundle, Entry};
use futures::future::join_all;

/// Entries of `bundle` at `level` under `root_id`
///
/// Level 1 returns exactly the root entry when present, regardless of
/// bundle size. Children are matched by partOf suffix equality against
/// the parent id. A missing root, or a level below the deepest populated
/// one, yields an empty bundle.
pub async fn filter_level(bundle: &Bundle, root_id: &str, level: u32) -> Bundle {
    let mut result = Bundle::empty();
    if bundle.is_empty() || root_id.is_empty() || level == 0 {
        return result;
    }
    let Some(root) = bundle.find_by_id(root_id) else {
        return result;
    };
    if level == 1 {
        result.entry.push(root.clone());
        return result;
    }

    let mut frontier: Vec<Entry> = vec![root.clone()];
    for _ in 1..level {
        let expansions = frontier.iter().map(|parent| {
            let parent_id = parent.resource.id.clone();
            async move { children_of(bundle, &parent_id) }
        });
        frontier = join_all(expansions).await.into_iter().flatten().collect();
        if frontier.is_empty() {
            break;
        }
    }

    result.entry = frontier;
    result
}

fn children_of(bundle: &Bundle, parent_id: &str) -> Vec<Entry> {
    bundle
        .entry
        .iter()
        .filter(|e| {
            e.resource
                .part_of
                .as_ref()
                .map(|p| p.reference.ends_with(parent_id))
                .unwrap_or(false)
        })
        .cloned()
        .collect()
}
