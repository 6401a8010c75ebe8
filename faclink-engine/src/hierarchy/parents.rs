//! In-memory parent-chain resolution
//!
//! Walks the partOf references of an already-fetched bundle, leaf first.
//! The resolver memoizes only the single most recently computed
//! (start, detail) chain: grid projection resolves the same chain for
//! every sibling facility in a district, and one slot is enough to absorb
//! that without growing a real cache.

use crate::model::{Bundle, Location, Position};
use serde::Serialize;

/// How each ancestor is represented in a resolved chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDetail {
    /// Ancestor ids only
    Id,
    /// Ancestor display names only
    Name,
    /// Full summaries (name, id, position)
    Full,
}

/// Summary of one ancestor in full detail mode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentSummary {
    pub name: String,
    pub id: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// One resolved ancestor, shaped per [`ParentDetail`]
#[derive(Debug, Clone, PartialEq)]
pub enum ParentItem {
    Id(String),
    Name(String),
    Full(ParentSummary),
}

impl ParentItem {
    pub fn id(&self) -> Option<&str> {
        match self {
            ParentItem::Id(id) => Some(id),
            ParentItem::Full(summary) => Some(&summary.id),
            ParentItem::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ParentItem::Name(name) => Some(name),
            ParentItem::Full(summary) => Some(&summary.name),
            ParentItem::Id(_) => None,
        }
    }

    pub(crate) fn of(location: &Location, detail: ParentDetail) -> Self {
        match detail {
            ParentDetail::Id => ParentItem::Id(location.id.clone()),
            ParentDetail::Name => ParentItem::Name(location.name.clone()),
            ParentDetail::Full => ParentItem::Full(ParentSummary {
                name: location.name.clone(),
                id: location.id.clone(),
                latitude: location.position.as_ref().map(|p: &Position| p.latitude),
                longitude: location.position.as_ref().map(|p| p.longitude),
            }),
        }
    }
}

struct Memo {
    start: String,
    detail: ParentDetail,
    chain: Vec<ParentItem>,
}

/// Parent-chain resolver over one in-memory bundle
pub struct ChainResolver<'a> {
    bundle: &'a Bundle,
    memo: Option<Memo>,
}

impl<'a> ChainResolver<'a> {
    pub fn new(bundle: &'a Bundle) -> Self {
        Self { bundle, memo: None }
    }

    /// Resolve the chain starting at `start` (an id or a
    /// `Location/<id>` reference), leaf first
    ///
    /// The starting node itself is included when it exists in the
    /// bundle; the walk ends at the first node without a resolvable
    /// parent. Returns a copy; the memo keeps the original.
    pub fn resolve(&mut self, start: &str, detail: ParentDetail) -> Vec<ParentItem> {
        let start_id = start.rsplit('/').next().unwrap_or(start).to_string();

        if let Some(memo) = &self.memo {
            if memo.start == start_id && memo.detail == detail {
                return memo.chain.clone();
            }
        }

        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut current = start_id.clone();

        while seen.insert(current.clone()) {
            let Some(entry) = self.bundle.find_by_id(&current) else {
                break;
            };
            chain.push(ParentItem::of(&entry.resource, detail));
            match entry.resource.parent_id() {
                Some(parent) => current = parent.to_string(),
                None => break,
            }
        }

        self.memo = Some(Memo {
            start: start_id,
            detail,
            chain: chain.clone(),
        });
        chain
    }
}
