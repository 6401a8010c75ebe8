//! Hierarchy traversal engine
//!
//! Level filtering, parent-chain resolution, depth counting, tree
//! assembly and grid projection over location bundles. Everything here
//! operates on bundles already fetched through the store; the only
//! pieces that issue remote queries are the depth counter and the
//! store-backed parent-chain variant in [`crate::store`].

pub mod depth;
pub mod filter;
pub mod grid;
pub mod parents;
pub mod tree;

pub use depth::count_levels;
pub use filter::filter_level;
pub use grid::{build_grid, GridCell, GridPage, GridRow};
pub use parents::{ChainResolver, ParentDetail, ParentItem, ParentSummary};
pub use tree::{build_tree, TreeNode};
