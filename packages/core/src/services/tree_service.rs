//! Tree Service - Materialized-Path Tree Operations
//!
//! This module provides the business logic layer over a `TreeStore`:
//!
//! - Lazy, race-safe root creation per tenant
//! - Scoped lookups (by id, code or path) and parent/child navigation
//! - Descendant and ancestor queries answered with a single store read
//! - Create, update, move (subtree path rewrite), delete and batch create
//! - Paginated search by name, owner and depth
//!
//! # Tenant Scope
//!
//! Every operation takes a `TenantScope`. A lookup that misses inside the
//! scope fails with `Unauthorized`, whether the node does not exist or
//! belongs to another tenant.
//!
//! # Transactions
//!
//! Multi-row mutations (update, move, delete, batch create) run their body
//! against a `TreeTransaction` and hand the result to `complete`, which
//! commits on `Ok` and rolls back on `Err`. Bodies live in their own
//! functions so that every early return still reaches `complete`.
//!
//! The `*_in` variants run the same bodies against a transaction the caller
//! obtained from `begin()`, so tree changes can commit atomically with the
//! caller's other writes. They never commit or roll back themselves.
//!
//! # Examples
//!
//! ```no_run
//! # use pathtree_core::config::TreeConfig;
//! # use pathtree_core::models::{CreateNodeParams, TenantScope, TreePath};
//! # use pathtree_core::services::TreeService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TreeService::open(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?;
//! let tenant = TenantScope::new("organizations", "42")?;
//!
//! let root = service.get_root_node(&tenant).await?;
//! let team = service
//!     .create_node(&tenant, CreateNodeParams::new("Engineering", root.path.clone()))
//!     .await?;
//! let descendants = service.get_descendants(&tenant, &TreePath::root()).await?;
//! assert_eq!(descendants[0].code, team.code);
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::{DatabaseError, DatabaseService, LibsqlTreeStore, TreeStore, TreeTransaction};
use crate::models::{
    CreateNodeParams, IdSource, NodeFilter, NodeId, NodeKey, NodeUpdate, NodeWithChildren,
    OrderBy, OwnerRef, Page, PathError, TenantScope, TreeNode, TreePath, UlidSource,
};
use crate::services::error::TreeServiceError;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Tree orchestrator over a tenant-scoped store
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn TreeStore>,

    /// Source of node codes
    ids: Arc<dyn IdSource>,

    config: TreeConfig,
}

impl TreeService {
    /// Create a new TreeService
    ///
    /// The configuration is validated once here; an invalid one fails with
    /// `InvalidConfig`.
    pub fn new(store: Arc<dyn TreeStore>, config: TreeConfig) -> Result<Self, TreeServiceError> {
        config.validate()?;

        Ok(Self {
            store,
            ids: Arc::new(UlidSource::new()),
            config,
        })
    }

    /// Open (or create) a libsql database file and build a service over it
    pub async fn open(db_path: PathBuf, config: TreeConfig) -> Result<Self, TreeServiceError> {
        let db = DatabaseService::new(db_path, &config).await?;
        let store: Arc<dyn TreeStore> = Arc::new(LibsqlTreeStore::new(Arc::new(db)));
        Self::new(store, config)
    }

    /// Replace the identifier source
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn store(&self) -> &Arc<dyn TreeStore> {
        &self.store
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Root
    // ------------------------------------------------------------------

    /// Return the tenant's root node, creating it on first access
    ///
    /// Concurrent first accesses are resolved by the unique `(tenant, path)`
    /// index: the loser of the insert race re-reads the winner's root.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_root_node(&self, scope: &TenantScope) -> Result<TreeNode, TreeServiceError> {
        let root_filter = NodeFilter::new().with_path(TreePath::root());

        if let Some(root) = self.store.find_node(scope, &root_filter).await? {
            return Ok(root);
        }

        let mut root = TreeNode::new_root(self.ids.new_id(), scope.clone(), &self.config.root_name);
        root.validate()?;

        match self
            .store
            .insert_nodes(std::slice::from_ref(&root), self.config.insert_chunk_size)
            .await
        {
            Ok(ids) => {
                root.id = first_id(ids)?;
                info!("Created root node {} for tenant {}", root.code, scope);
                Ok(root)
            }
            Err(e) if e.is_unique_violation() => {
                debug!("Root for tenant {} created concurrently, re-reading", scope);
                self.store
                    .find_node(scope, &root_filter)
                    .await?
                    .ok_or_else(|| TreeServiceError::Database(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------
    // Point lookups
    // ------------------------------------------------------------------

    /// Look up a single node inside the tenant
    ///
    /// The root path resolves through `get_root_node`.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_node(
        &self,
        scope: &TenantScope,
        key: NodeKey,
    ) -> Result<TreeNode, TreeServiceError> {
        if let NodeKey::Path(path) = &key {
            check_path(path)?;
            if path.is_root() {
                return self.get_root_node(scope).await;
            }
        }

        let filter = key_filter(&key);
        self.store
            .find_node(scope, &filter)
            .await?
            .ok_or_else(|| TreeServiceError::unauthorized(&key))
    }

    pub async fn get_node_by_code(
        &self,
        scope: &TenantScope,
        code: &NodeId,
    ) -> Result<TreeNode, TreeServiceError> {
        self.get_node(scope, NodeKey::Code(code.clone())).await
    }

    pub async fn get_node_by_path(
        &self,
        scope: &TenantScope,
        path: &TreePath,
    ) -> Result<TreeNode, TreeServiceError> {
        self.get_node(scope, NodeKey::Path(path.clone())).await
    }

    pub async fn get_node_by_id(
        &self,
        scope: &TenantScope,
        id: i64,
    ) -> Result<TreeNode, TreeServiceError> {
        self.get_node(scope, NodeKey::Id(id)).await
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Parent of `node`, looked up in the node's own tenant
    pub async fn get_parent_of(&self, node: &TreeNode) -> Result<TreeNode, TreeServiceError> {
        let parent_code = node
            .parent_code
            .as_ref()
            .ok_or(TreeServiceError::RootHasNoParent)?;
        self.get_node_by_code(&node.tenant, parent_code).await
    }

    pub async fn get_parent_by_code(
        &self,
        scope: &TenantScope,
        code: &NodeId,
    ) -> Result<TreeNode, TreeServiceError> {
        let node = self.get_node_by_code(scope, code).await?;
        self.get_parent_of(&node).await
    }

    pub async fn get_parent_by_path(
        &self,
        scope: &TenantScope,
        path: &TreePath,
    ) -> Result<TreeNode, TreeServiceError> {
        let node = self.get_node_by_path(scope, path).await?;
        self.get_parent_of(&node).await
    }

    /// Direct children of the node with `parent_code`, in creation order
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_children(
        &self,
        scope: &TenantScope,
        parent_code: &NodeId,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        let filter = NodeFilter::new().with_parent_code(parent_code.clone());
        Ok(self.store.find_nodes(scope, &filter).await?)
    }

    pub async fn get_children_by_path(
        &self,
        scope: &TenantScope,
        parent_path: &TreePath,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        let parent = self.get_node_by_path(scope, parent_path).await?;
        self.get_children(scope, &parent.code).await
    }

    /// All strict descendants of `path`, parents before children
    ///
    /// One prefix read regardless of depth. An unknown path yields an empty
    /// list.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_descendants(
        &self,
        scope: &TenantScope,
        path: &TreePath,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        check_path(path)?;

        let filter = NodeFilter::new()
            .with_descendants_of(path.clone())
            .with_order_by(OrderBy::PathAsc);
        let nodes = self.store.find_nodes(scope, &filter).await?;

        debug!("Found {} descendant(s) of {}", nodes.len(), path);
        Ok(nodes)
    }

    /// Strict ancestors of `path` below the root, shallowest first
    ///
    /// Looked up with one batched read. An ancestor that cannot be found
    /// (for example deleted concurrently) is omitted instead of failing the
    /// call.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_ancestors(
        &self,
        scope: &TenantScope,
        path: &TreePath,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        check_path(path)?;

        let wanted = path.ancestors();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let filter = NodeFilter::new().with_paths(wanted.clone());
        let mut by_path: HashMap<TreePath, TreeNode> = self
            .store
            .find_nodes(scope, &filter)
            .await?
            .into_iter()
            .map(|node| (node.path.clone(), node))
            .collect();

        let mut ancestors = Vec::with_capacity(wanted.len());
        for ancestor_path in &wanted {
            match by_path.remove(ancestor_path) {
                Some(node) => ancestors.push(node),
                None => warn!("Ancestor {} of {} not found, omitting", ancestor_path, path),
            }
        }

        Ok(ancestors)
    }

    /// The ancestor chain of `path` as a nested structure
    ///
    /// The shallowest ancestor is on top and every level holds exactly one
    /// child. `None` when `path` has no ancestors below the root.
    pub async fn get_nested_ancestors(
        &self,
        scope: &TenantScope,
        path: &TreePath,
    ) -> Result<Option<NodeWithChildren>, TreeServiceError> {
        let ancestors = self.get_ancestors(scope, path).await?;

        let nested = ancestors.into_iter().rev().fold(None, |child, node| {
            let mut level = NodeWithChildren::leaf(node);
            level.children.extend(child);
            Some(level)
        });

        Ok(nested)
    }

    /// A node plus one page of its direct children and the total child count
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn get_node_with_children(
        &self,
        scope: &TenantScope,
        key: NodeKey,
        limit: usize,
        offset: usize,
    ) -> Result<(NodeWithChildren, u64), TreeServiceError> {
        let node = self.get_node(scope, key).await?;

        let filter = NodeFilter::new()
            .with_parent_code(node.code.clone())
            .with_limit(self.clamp_limit(limit))
            .with_offset(offset);
        let page = self.fetch_page(scope, filter).await?;

        let nested = NodeWithChildren {
            node,
            children: page.items.into_iter().map(NodeWithChildren::leaf).collect(),
        };
        Ok((nested, page.total))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Create a node under an existing parent
    ///
    /// The parent check and the insert are not one snapshot: a parent
    /// deleted in between is an accepted race.
    #[instrument(skip(self, scope, params), fields(tenant = %scope, parent = %params.parent_path))]
    pub async fn create_node(
        &self,
        scope: &TenantScope,
        params: CreateNodeParams,
    ) -> Result<TreeNode, TreeServiceError> {
        check_path(&params.parent_path)?;

        let parent = if params.parent_path.is_root() {
            self.get_root_node(scope).await?
        } else {
            self.store
                .find_node(scope, &NodeFilter::new().with_path(params.parent_path.clone()))
                .await?
                .ok_or_else(|| TreeServiceError::parent_not_found(params.parent_path.as_str()))?
        };

        let mut node = self.build_child(&parent, params)?;
        let ids = self
            .store
            .insert_nodes(std::slice::from_ref(&node), self.config.insert_chunk_size)
            .await?;
        node.id = first_id(ids)?;

        info!("Created node {} at {}", node.code, node.path);
        Ok(node)
    }

    /// Update the non-structural fields of a node
    #[instrument(skip(self, scope, update), fields(tenant = %scope))]
    pub async fn update_node(
        &self,
        scope: &TenantScope,
        key: NodeKey,
        update: NodeUpdate,
    ) -> Result<TreeNode, TreeServiceError> {
        if let NodeKey::Path(path) = &key {
            check_path(path)?;
        }

        if update.is_empty() {
            return self.get_node(scope, key).await;
        }

        let mut tx = self.store.begin().await?;
        let result = apply_update(tx.as_mut(), scope, &key, &update).await;
        let node = complete(tx, result).await?;

        info!("Updated node {}", node.code);
        Ok(node)
    }

    /// Move the node at `path` (with its subtree) under `new_parent_path`
    ///
    /// The moved node and every descendant get their path prefix rewritten
    /// in one transaction. Moving a node to its current parent changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidMove` if `path` is the root, or `new_parent_path` is `path`
    ///   itself or lies inside its subtree
    /// - `ParentNotFound` if `new_parent_path` does not resolve
    /// - `Unauthorized` if `path` does not resolve
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn move_node(
        &self,
        scope: &TenantScope,
        path: &TreePath,
        new_parent_path: &TreePath,
    ) -> Result<TreeNode, TreeServiceError> {
        check_move(path, new_parent_path)?;

        // Root parent is resolved (and created if needed) before the transaction
        let root_parent = if new_parent_path.is_root() {
            Some(self.get_root_node(scope).await?)
        } else {
            None
        };

        let mut tx = self.store.begin().await?;
        let result = move_subtree(tx.as_mut(), scope, path, new_parent_path, root_parent).await;
        let (node, rewritten) = complete(tx, result).await?;

        info!(
            "Moved {} to {} ({} descendant path(s) rewritten)",
            path, node.path, rewritten
        );
        Ok(node)
    }

    /// Delete the node at `path`
    ///
    /// Without `cascade` a node that still has descendants is rejected with
    /// `HasDescendants`. With `cascade` the node and its whole subtree are
    /// soft-deleted together. Returns the number of deleted nodes.
    ///
    /// Deleting the root with `cascade` clears the tenant's tree; the next
    /// `get_root_node` creates a fresh root.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn delete_node(
        &self,
        scope: &TenantScope,
        path: &TreePath,
        cascade: bool,
    ) -> Result<u64, TreeServiceError> {
        check_path(path)?;

        let mut tx = self.store.begin().await?;
        let result = delete_subtree(tx.as_mut(), scope, path, cascade).await;
        let deleted = complete(tx, result).await?;

        info!("Deleted {} node(s) at {}", deleted, path);
        Ok(deleted)
    }

    /// Create many nodes in one transaction
    ///
    /// All distinct parent paths are resolved with one batched read. If any
    /// of them is missing the whole batch fails with `ParentNotFound` and
    /// nothing is inserted. Results are returned in input order.
    #[instrument(skip(self, scope, items), fields(tenant = %scope, count = items.len()))]
    pub async fn batch_create_nodes(
        &self,
        scope: &TenantScope,
        items: Vec<CreateNodeParams>,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut parent_paths = batch_parent_paths(&items)?;
        let root_parent = if parent_paths.remove(&TreePath::root()) {
            Some(self.get_root_node(scope).await?)
        } else {
            None
        };

        let mut tx = self.store.begin().await?;
        let result = self
            .insert_batch(tx.as_mut(), scope, items, parent_paths, root_parent)
            .await;
        let nodes = complete(tx, result).await?;

        info!("Batch created {} node(s)", nodes.len());
        Ok(nodes)
    }

    // ------------------------------------------------------------------
    // Caller transactions
    // ------------------------------------------------------------------

    /// Start a transaction for the `*_in` operations
    ///
    /// The caller owns the transaction: tree writes made through it become
    /// visible only when the caller commits, together with anything else the
    /// caller wrote on it.
    pub async fn begin(&self) -> Result<Box<dyn TreeTransaction>, TreeServiceError> {
        Ok(self.store.begin().await?)
    }

    /// `create_node` inside a caller transaction
    ///
    /// The root is resolved (and created if absent) through `tx` as well.
    #[instrument(skip(self, tx, scope, params), fields(tenant = %scope, parent = %params.parent_path))]
    pub async fn create_node_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        params: CreateNodeParams,
    ) -> Result<TreeNode, TreeServiceError> {
        check_path(&params.parent_path)?;

        let parent = if params.parent_path.is_root() {
            self.root_in(tx, scope).await?
        } else {
            tx.find_node(scope, &NodeFilter::new().with_path(params.parent_path.clone()))
                .await?
                .ok_or_else(|| TreeServiceError::parent_not_found(params.parent_path.as_str()))?
        };

        let mut node = self.build_child(&parent, params)?;
        let ids = tx
            .insert_nodes(std::slice::from_ref(&node), self.config.insert_chunk_size)
            .await?;
        node.id = first_id(ids)?;

        debug!("Created node {} at {} (uncommitted)", node.code, node.path);
        Ok(node)
    }

    /// `update_node` inside a caller transaction
    pub async fn update_node_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        key: NodeKey,
        update: NodeUpdate,
    ) -> Result<TreeNode, TreeServiceError> {
        if let NodeKey::Path(path) = &key {
            check_path(path)?;
        }

        if update.is_empty() {
            return tx
                .find_node(scope, &key_filter(&key))
                .await?
                .ok_or_else(|| TreeServiceError::unauthorized(&key));
        }

        apply_update(tx, scope, &key, &update).await
    }

    /// `move_node` inside a caller transaction
    #[instrument(skip(self, tx, scope), fields(tenant = %scope))]
    pub async fn move_node_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        path: &TreePath,
        new_parent_path: &TreePath,
    ) -> Result<TreeNode, TreeServiceError> {
        check_move(path, new_parent_path)?;

        let root_parent = if new_parent_path.is_root() {
            Some(self.root_in(tx, scope).await?)
        } else {
            None
        };

        let (node, rewritten) = move_subtree(tx, scope, path, new_parent_path, root_parent).await?;
        debug!(
            "Moved {} to {} ({} descendant path(s) rewritten, uncommitted)",
            path, node.path, rewritten
        );
        Ok(node)
    }

    /// `delete_node` inside a caller transaction
    pub async fn delete_node_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        path: &TreePath,
        cascade: bool,
    ) -> Result<u64, TreeServiceError> {
        check_path(path)?;
        delete_subtree(tx, scope, path, cascade).await
    }

    /// `batch_create_nodes` inside a caller transaction
    #[instrument(skip(self, tx, scope, items), fields(tenant = %scope, count = items.len()))]
    pub async fn batch_create_nodes_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        items: Vec<CreateNodeParams>,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut parent_paths = batch_parent_paths(&items)?;
        let root_parent = if parent_paths.remove(&TreePath::root()) {
            Some(self.root_in(tx, scope).await?)
        } else {
            None
        };

        self.insert_batch(tx, scope, items, parent_paths, root_parent)
            .await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Case-insensitive substring search on node names
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn search_nodes(
        &self,
        scope: &TenantScope,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TreeNode>, TreeServiceError> {
        let filter = NodeFilter::new()
            .with_name_contains(query)
            .with_limit(self.clamp_limit(limit))
            .with_offset(offset);
        self.fetch_page(scope, filter).await
    }

    #[instrument(skip(self, scope, owner), fields(tenant = %scope, owner = %owner))]
    pub async fn nodes_by_owner(
        &self,
        scope: &TenantScope,
        owner: &OwnerRef,
        limit: usize,
        offset: usize,
    ) -> Result<Page<TreeNode>, TreeServiceError> {
        let filter = NodeFilter::new()
            .with_owner(owner.clone())
            .with_limit(self.clamp_limit(limit))
            .with_offset(offset);
        self.fetch_page(scope, filter).await
    }

    /// All nodes at exactly `depth` segments
    ///
    /// Depth 0 is the root (created if absent). Deeper levels are selected
    /// by counting separators in the path.
    #[instrument(skip(self, scope), fields(tenant = %scope))]
    pub async fn nodes_by_depth(
        &self,
        scope: &TenantScope,
        depth: i64,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        if depth < 0 {
            return Err(PathError::NegativeDepth(depth).into());
        }

        if depth == 0 {
            return Ok(vec![self.get_root_node(scope).await?]);
        }

        let filter = NodeFilter::new().with_depth(depth as usize);
        Ok(self.store.find_nodes(scope, &filter).await?)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn clamp_limit(&self, limit: usize) -> usize {
        limit.min(self.config.max_page_size)
    }

    async fn fetch_page(
        &self,
        scope: &TenantScope,
        filter: NodeFilter,
    ) -> Result<Page<TreeNode>, TreeServiceError> {
        let total = self
            .store
            .count_nodes(scope, &filter.without_pagination())
            .await?;
        let items = self.store.find_nodes(scope, &filter).await?;
        Ok(Page { items, total })
    }

    /// The tenant's root as seen by `tx`, inserted through `tx` if absent
    ///
    /// A write transaction holds the database write lock, so no concurrent
    /// root insert can slip in between the read and the insert.
    async fn root_in(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
    ) -> Result<TreeNode, TreeServiceError> {
        if let Some(root) = tx
            .find_node(scope, &NodeFilter::new().with_path(TreePath::root()))
            .await?
        {
            return Ok(root);
        }

        let mut root = TreeNode::new_root(self.ids.new_id(), scope.clone(), &self.config.root_name);
        root.validate()?;
        let ids = tx
            .insert_nodes(std::slice::from_ref(&root), self.config.insert_chunk_size)
            .await?;
        root.id = first_id(ids)?;

        debug!("Created root node {} for tenant {} (uncommitted)", root.code, scope);
        Ok(root)
    }

    /// Build and validate a new node under `parent`
    fn build_child(
        &self,
        parent: &TreeNode,
        params: CreateNodeParams,
    ) -> Result<TreeNode, TreeServiceError> {
        let node = TreeNode::new_child(
            self.ids.new_id(),
            params.name,
            parent,
            params.owner,
            params.metadata,
        )?;
        node.validate()?;
        node.validate_against_parent(parent)?;
        Ok(node)
    }

    async fn insert_batch(
        &self,
        tx: &mut dyn TreeTransaction,
        scope: &TenantScope,
        items: Vec<CreateNodeParams>,
        parent_paths: BTreeSet<TreePath>,
        root_parent: Option<TreeNode>,
    ) -> Result<Vec<TreeNode>, TreeServiceError> {
        let mut parents: HashMap<TreePath, TreeNode> = HashMap::new();

        if !parent_paths.is_empty() {
            let filter = NodeFilter::new().with_paths(parent_paths.into_iter().collect());
            for parent in tx.find_nodes(scope, &filter).await? {
                parents.insert(parent.path.clone(), parent);
            }
        }
        if let Some(root) = root_parent {
            parents.insert(root.path.clone(), root);
        }

        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            let parent = parents
                .get(&item.parent_path)
                .ok_or_else(|| TreeServiceError::parent_not_found(item.parent_path.as_str()))?;
            nodes.push(self.build_child(parent, item)?);
        }

        let ids = tx
            .insert_nodes(&nodes, self.config.insert_chunk_size)
            .await?;
        for (node, id) in nodes.iter_mut().zip(ids) {
            node.id = id;
        }

        Ok(nodes)
    }
}

/// Release a transaction: commit on `Ok`, roll back on `Err`
async fn complete<T>(
    tx: Box<dyn TreeTransaction>,
    result: Result<T, TreeServiceError>,
) -> Result<T, TreeServiceError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Rollback failed after error '{}': {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

async fn apply_update(
    tx: &mut dyn TreeTransaction,
    scope: &TenantScope,
    key: &NodeKey,
    update: &NodeUpdate,
) -> Result<TreeNode, TreeServiceError> {
    let mut node = tx
        .find_node(scope, &key_filter(key))
        .await?
        .ok_or_else(|| TreeServiceError::unauthorized(key))?;

    update.apply_to(&mut node);
    node.validate()?;

    if tx.update_node(scope, &node).await? == 0 {
        return Err(TreeServiceError::unauthorized(key));
    }

    Ok(node)
}

/// Returns the moved node and the number of rewritten descendants
async fn move_subtree(
    tx: &mut dyn TreeTransaction,
    scope: &TenantScope,
    path: &TreePath,
    new_parent_path: &TreePath,
    root_parent: Option<TreeNode>,
) -> Result<(TreeNode, u64), TreeServiceError> {
    let mut node = tx
        .find_node(scope, &NodeFilter::new().with_path(path.clone()))
        .await?
        .ok_or_else(|| TreeServiceError::unauthorized(NodeKey::Path(path.clone())))?;

    let parent = match root_parent {
        Some(root) => root,
        None => tx
            .find_node(scope, &NodeFilter::new().with_path(new_parent_path.clone()))
            .await?
            .ok_or_else(|| TreeServiceError::parent_not_found(new_parent_path.as_str()))?,
    };

    if node.parent_code.as_ref() == Some(&parent.code) {
        debug!("{} is already under {}", path, new_parent_path);
        return Ok((node, 0));
    }

    let new_path = parent.path.append_segment(node.code.as_str())?;
    let rewritten = tx.rebase_descendants(scope, path, &new_path).await?;

    node.path = new_path;
    node.parent_code = Some(parent.code.clone());
    node.updated_at = Utc::now();
    node.validate()?;
    node.validate_against_parent(&parent)?;

    if tx.update_node(scope, &node).await? == 0 {
        return Err(TreeServiceError::unauthorized(NodeKey::Path(path.clone())));
    }

    Ok((node, rewritten))
}

async fn delete_subtree(
    tx: &mut dyn TreeTransaction,
    scope: &TenantScope,
    path: &TreePath,
    cascade: bool,
) -> Result<u64, TreeServiceError> {
    let exists = tx
        .count_nodes(scope, &NodeFilter::new().with_path(path.clone()))
        .await?;
    if exists == 0 {
        return Err(TreeServiceError::unauthorized(NodeKey::Path(path.clone())));
    }

    let descendants = tx
        .count_nodes(scope, &NodeFilter::new().with_descendants_of(path.clone()))
        .await?;
    if !cascade && descendants > 0 {
        return Err(TreeServiceError::has_descendants(path.as_str(), descendants));
    }

    let deleted = tx
        .soft_delete(scope, &NodeFilter::new().with_subtree_of(path.clone()))
        .await?;
    Ok(deleted)
}

/// Structural move checks that need no store access
fn check_move(path: &TreePath, new_parent_path: &TreePath) -> Result<(), TreeServiceError> {
    check_path(path)?;
    check_path(new_parent_path)?;

    if path.is_root() {
        return Err(TreeServiceError::invalid_move(
            path.as_str(),
            new_parent_path.as_str(),
            "the root node cannot be moved",
        ));
    }

    if path == new_parent_path || path.contains(new_parent_path) {
        return Err(TreeServiceError::invalid_move(
            path.as_str(),
            new_parent_path.as_str(),
            "target is inside the moved subtree",
        ));
    }

    Ok(())
}

/// Caller paths must be well formed and made of node codes
fn check_path(path: &TreePath) -> Result<(), TreeServiceError> {
    for segment in path.segments() {
        if let Err(e) = NodeId::validate(segment) {
            debug!("Rejected path {}: {}", path, e);
            return Err(PathError::InvalidPath(path.to_string()).into());
        }
    }
    Ok(())
}

/// Distinct, checked parent paths of a batch
fn batch_parent_paths(items: &[CreateNodeParams]) -> Result<BTreeSet<TreePath>, TreeServiceError> {
    let mut parent_paths = BTreeSet::new();
    for item in items {
        check_path(&item.parent_path)?;
        parent_paths.insert(item.parent_path.clone());
    }
    Ok(parent_paths)
}

fn key_filter(key: &NodeKey) -> NodeFilter {
    match key {
        NodeKey::Id(id) => NodeFilter::new().with_id(*id),
        NodeKey::Code(code) => NodeFilter::new().with_code(code.clone()),
        NodeKey::Path(path) => NodeFilter::new().with_path(path.clone()),
    }
}

fn first_id(ids: Vec<i64>) -> Result<i64, TreeServiceError> {
    ids.into_iter().next().ok_or_else(|| {
        TreeServiceError::Database(DatabaseError::sql_execution("insert returned no id"))
    })
}

// Scenario tests in separate module
#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
