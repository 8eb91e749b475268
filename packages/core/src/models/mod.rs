//! Data Models
//!
//! This module contains the core data structures of a materialized-path tree:
//!
//! - `TreePath` - Path algebra (pure, no I/O)
//! - `NodeId` / `IdSource` - Time-ordered segment identifiers
//! - `TreeNode` - The node record, its scopes and its invariants
//! - `NodeFilter` - Scoped store read description

mod filter;
mod node_id;
mod path;
mod tree_node;

pub use filter::{NodeFilter, OrderBy};
pub use node_id::{IdSource, NodeId, UlidSource, NODE_ID_LEN};
pub use path::{PathError, TreePath, PATH_SEPARATOR, ROOT_PATH};
pub use tree_node::{
    CreateNodeParams, EntityRef, NodeKey, NodeUpdate, NodeWithChildren, OwnerRef, Page,
    TenantScope, TreeNode, ValidationError,
};
