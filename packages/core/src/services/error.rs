//! Service Layer Error Types
//!
//! This module defines error types for tree operations. Path algebra,
//! validation, configuration and store errors are wrapped transparently so
//! callers can match on the original variant.

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::models::{PathError, ValidationError};
use thiserror::Error;

/// Tree operation errors
///
/// `Unauthorized` deliberately covers both "no such node" and "node belongs
/// to another tenant".
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Path algebra failure (invalid path, segment, depth)
    ///
    /// Caller paths whose segments are not node codes are reported here as
    /// `PathError::InvalidPath` too.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Node or identifier validation failed
    #[error("Node validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Malformed configuration at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// The root has no parent to look up
    #[error("Root node has no parent")]
    RootHasNoParent,

    /// Parent path does not resolve within the tenant
    #[error("Parent not found: {path}")]
    ParentNotFound { path: String },

    /// Move would break the tree (root, self or own subtree as target)
    #[error("Invalid move of {path} under {new_parent}: {reason}")]
    InvalidMove {
        path: String,
        new_parent: String,
        reason: String,
    },

    /// Non-cascading delete of a node that still has descendants
    #[error("Node {path} has {count} descendant(s)")]
    HasDescendants { path: String, count: u64 },

    /// Scoped lookup miss
    #[error("Node not accessible in this tenant: {key}")]
    Unauthorized { key: String },
}

impl TreeServiceError {
    /// Create a parent not found error
    pub fn parent_not_found(path: impl Into<String>) -> Self {
        Self::ParentNotFound { path: path.into() }
    }

    /// Create an invalid move error
    pub fn invalid_move(
        path: impl Into<String>,
        new_parent: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidMove {
            path: path.into(),
            new_parent: new_parent.into(),
            reason: reason.into(),
        }
    }

    /// Create a has-descendants error
    pub fn has_descendants(path: impl Into<String>, count: u64) -> Self {
        Self::HasDescendants {
            path: path.into(),
            count,
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(key: impl ToString) -> Self {
        Self::Unauthorized {
            key: key.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
