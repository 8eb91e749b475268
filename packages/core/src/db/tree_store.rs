//! TreeStore Trait - Database Abstraction Layer
//!
//! This module defines the `TreeStore` and `TreeTransaction` traits that sit
//! between `TreeService` (tree rules) and the database implementation.
//!
//! # Design Decisions
//!
//! 1. **Scope is an argument**: every read and write takes a `TenantScope`,
//!    and implementations must apply it (plus the soft-delete predicate) to
//!    every statement. A `NodeFilter` can narrow a query but never widen it
//!    past the tenant.
//! 2. **Explicit transactions**: `begin()` hands out a `TreeTransaction` that
//!    must be finished with `commit()` or `rollback()`. A transaction dropped
//!    without either is discarded.
//! 3. **Typed errors**: methods return `DatabaseError`, with unique-index
//!    conflicts reported as `DatabaseError::UniqueViolation`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pathtree_core::config::TreeConfig;
//! use pathtree_core::db::{DatabaseService, LibsqlTreeStore, TreeStore};
//! use pathtree_core::models::{NodeFilter, TenantScope, TreePath};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = DatabaseService::new(PathBuf::from("./tree.db"), &TreeConfig::default()).await?;
//!     let store: Arc<dyn TreeStore> = Arc::new(LibsqlTreeStore::new(Arc::new(db)));
//!
//!     let scope = TenantScope::new("organizations", "1")?;
//!     let roots = store
//!         .find_nodes(&scope, &NodeFilter::new().with_path(TreePath::root()))
//!         .await?;
//!     println!("{} root(s)", roots.len());
//!     Ok(())
//! }
//! ```

use crate::db::error::DatabaseError;
use crate::models::{NodeFilter, TenantScope, TreeNode, TreePath};
use async_trait::async_trait;

/// Scoped persistence of tree nodes
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single store can be shared
/// across tasks behind an `Arc`.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Live nodes of `scope` matching `filter`
    async fn find_nodes(
        &self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Vec<TreeNode>, DatabaseError>;

    /// First match of `filter`, if any
    async fn find_node(
        &self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Option<TreeNode>, DatabaseError> {
        let filter = filter.clone().with_limit(1);
        Ok(self.find_nodes(scope, &filter).await?.into_iter().next())
    }

    /// Number of live nodes matching `filter` (pagination ignored)
    async fn count_nodes(
        &self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError>;

    /// Insert nodes in one autocommitted statement per chunk, returning the
    /// assigned row ids in input order
    async fn insert_nodes(
        &self,
        nodes: &[TreeNode],
        chunk_size: usize,
    ) -> Result<Vec<i64>, DatabaseError>;

    /// Start a write transaction
    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError>;
}

/// A unit of work against the store
///
/// Reads inside the transaction observe its own uncommitted writes.
#[async_trait]
pub trait TreeTransaction: Send {
    async fn find_nodes(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Vec<TreeNode>, DatabaseError>;

    async fn find_node(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Option<TreeNode>, DatabaseError> {
        let filter = filter.clone().with_limit(1);
        Ok(self.find_nodes(scope, &filter).await?.into_iter().next())
    }

    async fn count_nodes(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError>;

    async fn insert_nodes(
        &mut self,
        nodes: &[TreeNode],
        chunk_size: usize,
    ) -> Result<Vec<i64>, DatabaseError>;

    /// Overwrite the mutable columns of the live node with `node.code`
    ///
    /// Writes `name`, `path`, `parent_code`, `owner`, `metadata` and
    /// `updated_at`. Returns the number of rows changed.
    async fn update_node(
        &mut self,
        scope: &TenantScope,
        node: &TreeNode,
    ) -> Result<u64, DatabaseError>;

    /// Replace the `from` prefix with `to` on every live strict descendant
    /// of `from`
    ///
    /// The whole subtree is rewritten by one statement without loading it.
    /// The node at `from` itself is left alone. Returns the number of
    /// rewritten rows.
    async fn rebase_descendants(
        &mut self,
        scope: &TenantScope,
        from: &TreePath,
        to: &TreePath,
    ) -> Result<u64, DatabaseError>;

    /// Mark every live node matching `filter` as deleted
    async fn soft_delete(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
