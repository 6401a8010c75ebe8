//! Tree assembly
//!
//! Builds nested children arrays from a flat jurisdiction bundle.
//! Entries arrive in no particular order; a child seen before its parent
//! is parked in a pending-attachment map keyed by the missing parent id
//! and spliced in once the parent appears. Parents that never appear are
//! logged in a final reconciliation pass.

use crate::model::Bundle;
use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

/// One node of an assembled hierarchy tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub children: Vec<TreeNode>,
}

struct Arena {
    nodes: Vec<TreeNode>,
    children: Vec<Vec<usize>>,
}

impl Arena {
    fn push(&mut self, id: &str, name: &str) -> usize {
        self.nodes.push(TreeNode {
            id: id.to_string(),
            name: name.to_string(),
            children: Vec::new(),
        });
        self.children.push(Vec::new());
        self.nodes.len() - 1
    }

    fn assemble(&self, index: usize) -> TreeNode {
        let mut node = self.nodes[index].clone();
        node.children = self.children[index]
            .iter()
            .map(|&child| self.assemble(child))
            .collect();
        sort_siblings(&mut node.children);
        node
    }
}

/// Build the jurisdiction tree of a bundle
///
/// Building-type entries are excluded. Siblings are sorted by
/// case-folded name recursively. When the synthetic root wraps the real
/// top-level nodes it is unwrapped and its children returned directly.
pub fn build_tree(bundle: &Bundle, root_id: &str) -> Vec<TreeNode> {
    let mut arena = Arena {
        nodes: Vec::new(),
        children: Vec::new(),
    };
    let mut lookup: HashMap<String, usize> = HashMap::new();
    let mut top: Vec<usize> = Vec::new();
    let mut pending: HashMap<String, Vec<usize>> = HashMap::new();

    for entry in &bundle.entry {
        if entry.resource.is_building() {
            continue;
        }
        let id = entry.resource.id.as_str();
        let index = arena.push(id, &entry.resource.name);
        lookup.insert(id.to_string(), index);

        // splice in children that arrived before this node
        if let Some(waiting) = pending.remove(id) {
            arena.children[index].extend(waiting);
        }

        if id == root_id || entry.resource.part_of.is_none() {
            top.push(index);
            continue;
        }
        let parent = entry.resource.parent_id().unwrap_or_default().to_string();
        match lookup.get(&parent) {
            Some(&parent_index) => arena.children[parent_index].push(index),
            None => pending.entry(parent).or_default().push(index),
        }
    }

    for (parent, orphans) in &pending {
        error!(
            parent = %parent,
            orphans = orphans.len(),
            "Couldn't find parent in tree"
        );
    }

    let mut tree: Vec<TreeNode> = top.iter().map(|&index| arena.assemble(index)).collect();
    sort_siblings(&mut tree);

    // unwrap the synthetic root so its children are the top-level list
    if let Some(position) = tree.iter().position(|n| n.id == root_id) {
        return tree.swap_remove(position).children;
    }
    tree
}

fn sort_siblings(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}
