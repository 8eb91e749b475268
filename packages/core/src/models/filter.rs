//! Store Query Filters
//!
//! `NodeFilter` describes a scoped read against the tree table. The tenant
//! scope is never part of the filter: stores take it as a separate argument
//! and apply it to every statement, together with the soft-delete predicate.
//!
//! All set fields are combined with AND.
//!
//! # Examples
//!
//! ```rust
//! use pathtree_core::models::{NodeFilter, TreePath};
//!
//! // Strict descendants of /a, first page of 50
//! let filter = NodeFilter::new()
//!     .with_descendants_of(TreePath::parse("/a").unwrap())
//!     .with_limit(50);
//! ```

use crate::models::node_id::NodeId;
use crate::models::path::TreePath;
use crate::models::tree_node::OwnerRef;
use serde::{Deserialize, Serialize};

/// Sort order of query results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    /// Insertion order
    #[default]
    IdAsc,
    /// Lexicographic path order (parents before their descendants)
    PathAsc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilter {
    /// Filter by store row id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Filter by a set of node codes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codes: Option<Vec<NodeId>>,

    /// Filter by a set of exact paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<TreePath>>,

    /// Filter by parent code (direct children)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<NodeId>,

    /// Strict descendants of a path (prefix pattern, path itself excluded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descendants_of: Option<TreePath>,

    /// A path and all of its strict descendants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtree_of: Option<TreePath>,

    /// Case-insensitive substring match on the name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,

    /// Exact depth (segment count), derived from the separator count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_code(self, code: NodeId) -> Self {
        self.with_codes(vec![code])
    }

    pub fn with_codes(mut self, codes: Vec<NodeId>) -> Self {
        self.codes = Some(codes);
        self
    }

    pub fn with_path(self, path: TreePath) -> Self {
        self.with_paths(vec![path])
    }

    pub fn with_paths(mut self, paths: Vec<TreePath>) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn with_parent_code(mut self, parent_code: NodeId) -> Self {
        self.parent_code = Some(parent_code);
        self
    }

    pub fn with_descendants_of(mut self, path: TreePath) -> Self {
        self.descendants_of = Some(path);
        self
    }

    pub fn with_subtree_of(mut self, path: TreePath) -> Self {
        self.subtree_of = Some(path);
        self
    }

    pub fn with_name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The same filter without pagination, for counting total matches
    pub fn without_pagination(&self) -> Self {
        Self {
            limit: None,
            offset: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let path = TreePath::parse("/a").unwrap();
        let filter = NodeFilter::new()
            .with_descendants_of(path.clone())
            .with_name_contains("eng")
            .with_limit(10)
            .with_offset(20);

        assert_eq!(filter.descendants_of, Some(path));
        assert_eq!(filter.name_contains.as_deref(), Some("eng"));
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.offset, Some(20));
    }

    #[test]
    fn test_without_pagination_keeps_predicates() {
        let filter = NodeFilter::new()
            .with_depth(2)
            .with_limit(5)
            .with_offset(5)
            .without_pagination();

        assert_eq!(filter.depth, Some(2));
        assert!(filter.limit.is_none());
        assert!(filter.offset.is_none());
    }

    #[test]
    fn test_single_path_and_code_helpers() {
        let path = TreePath::parse("/a/b").unwrap();
        let filter = NodeFilter::new().with_path(path.clone());
        assert_eq!(filter.paths, Some(vec![path]));
    }
}
