//! Tree Node Data Structures
//!
//! This module defines the `TreeNode` record and the values used to scope,
//! create and update it.
//!
//! # Architecture
//!
//! - **Materialized path**: every node stores its full ancestry in `path`
//! - **Parent cache**: `parent_code` mirrors `path.parent()` for fast child lookups
//! - **Tenant scope**: `(tenant_type, tenant_id)` isolates one tree from another
//! - **Tagged owner**: an optional `(owner_type, owner_id)` reference that cannot
//!   be half-set
//!
//! # Examples
//!
//! ```rust
//! use pathtree_core::models::{IdSource, OwnerRef, TenantScope, TreeNode, UlidSource};
//! use serde_json::json;
//!
//! let ids = UlidSource::new();
//! let tenant = TenantScope::new("organizations", "1").unwrap();
//! let root = TreeNode::new_root(ids.new_id(), tenant, "root");
//!
//! let child = TreeNode::new_child(
//!     ids.new_id(),
//!     "Engineering",
//!     &root,
//!     Some(OwnerRef::new("users", "123").unwrap()),
//!     json!({}),
//! )
//! .unwrap();
//!
//! assert!(child.validate().is_ok());
//! assert!(child.validate_against_parent(&root).is_ok());
//! ```

use crate::models::node_id::NodeId;
use crate::models::path::{PathError, TreePath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Validation errors for tree entities and identifiers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid node ID format: {0}")]
    InvalidId(String),

    #[error("Invalid entity reference: {0}")]
    InvalidReference(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Inconsistent path: {0}")]
    InconsistentPath(String),

    #[error("Metadata validation failed: {0}")]
    InvalidMetadata(String),
}

/// A discriminated reference to an external entity (`kind` + `id`)
///
/// Both parts are required, so a kind can never be stored without its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    kind: String,
    id: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Result<Self, ValidationError> {
        let kind = kind.into();
        let id = id.into();

        if kind.trim().is_empty() {
            return Err(ValidationError::InvalidReference(
                "kind cannot be empty".to_string(),
            ));
        }
        if id.trim().is_empty() {
            return Err(ValidationError::InvalidReference(format!(
                "id cannot be empty for kind {:?}",
                kind
            )));
        }

        Ok(Self { kind, id })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Isolation scope of one logical tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantScope(EntityRef);

impl TenantScope {
    pub fn new(
        tenant_type: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        EntityRef::new(tenant_type, tenant_id).map(Self)
    }

    pub fn tenant_type(&self) -> &str {
        self.0.kind()
    }

    pub fn tenant_id(&self) -> &str {
        self.0.id()
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Polymorphic owner of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRef(EntityRef);

impl OwnerRef {
    pub fn new(
        owner_type: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        EntityRef::new(owner_type, owner_id).map(Self)
    }

    pub fn owner_type(&self) -> &str {
        self.0.kind()
    }

    pub fn owner_id(&self) -> &str {
        self.0.id()
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A node of a materialized-path tree.
///
/// # Fields
///
/// - `id`: Store-assigned row identifier (0 until inserted)
/// - `code`: Unique node identifier, also the last segment of `path`
/// - `name`: Free text
/// - `path`: Current materialized path, unique within the tenant
/// - `parent_code`: Parent's `code`; `None` only for the tenant's root
/// - `tenant`: Isolation scope
/// - `owner`: Optional polymorphic owner
/// - `metadata`: Opaque JSON object
///
/// The root is the only node whose path does not end with its own code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    /// Store row identifier
    pub id: i64,

    /// Unique node identifier
    pub code: NodeId,

    pub name: String,

    /// Materialized path (last segment is `code` for non-root nodes)
    pub path: TreePath,

    /// Cached `code` of the node at `path.parent()`
    pub parent_code: Option<NodeId>,

    pub tenant: TenantScope,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,

    /// Opaque payload (must be a JSON object)
    pub metadata: Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl TreeNode {
    /// Create the root node of a tenant
    pub fn new_root(code: NodeId, tenant: TenantScope, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            code,
            name: name.into(),
            path: TreePath::root(),
            parent_code: None,
            tenant,
            owner: None,
            metadata: json!({ "isRoot": true }),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a node directly under `parent`, inheriting its tenant
    pub fn new_child(
        code: NodeId,
        name: impl Into<String>,
        parent: &TreeNode,
        owner: Option<OwnerRef>,
        metadata: Value,
    ) -> Result<Self, PathError> {
        let path = parent.path.append_segment(code.as_str())?;
        let now = Utc::now();
        Ok(Self {
            id: 0,
            code,
            name: name.into(),
            path,
            parent_code: Some(parent.code.clone()),
            tenant: parent.tenant.clone(),
            owner,
            metadata,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn depth(&self) -> usize {
        self.path.depth()
    }

    /// Check the invariants a node must satisfy on its own
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - `name` is blank
    /// - `metadata` is not a JSON object
    /// - the root path and a null parent do not coincide
    /// - a non-root path does not end with the node's `code`
    /// - the node names itself as parent
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }

        if !self.metadata.is_object() {
            return Err(ValidationError::InvalidMetadata(
                "metadata must be a JSON object".to_string(),
            ));
        }

        match (&self.parent_code, self.path.is_root()) {
            (None, true) => return Ok(()),
            (Some(_), true) => {
                return Err(ValidationError::InvalidParent(
                    "root node cannot have a parent".to_string(),
                ))
            }
            (None, false) => {
                return Err(ValidationError::InvalidParent(format!(
                    "node at {} has no parent",
                    self.path
                )))
            }
            (Some(parent_code), false) if parent_code == &self.code => {
                return Err(ValidationError::InvalidParent(
                    "node cannot be its own parent".to_string(),
                ))
            }
            (Some(_), false) => {}
        }

        let last = self
            .path
            .last_segment()
            .map_err(|e| ValidationError::InconsistentPath(e.to_string()))?;
        if last != self.code.as_str() {
            return Err(ValidationError::InconsistentPath(format!(
                "path {} does not end with code {}",
                self.path, self.code
            )));
        }

        Ok(())
    }

    /// Cross-check this node against the node it claims as parent
    pub fn validate_against_parent(&self, parent: &TreeNode) -> Result<(), ValidationError> {
        if self.tenant != parent.tenant {
            return Err(ValidationError::InvalidParent(
                "parent belongs to another tenant".to_string(),
            ));
        }

        if self.parent_code.as_ref() != Some(&parent.code) {
            return Err(ValidationError::InvalidParent(format!(
                "parent_code does not reference {}",
                parent.code
            )));
        }

        if !parent.path.is_direct_parent_of(&self.path) {
            return Err(ValidationError::InconsistentPath(format!(
                "{} is not directly under {}",
                self.path, parent.path
            )));
        }

        Ok(())
    }
}

/// Lookup key for a single node within a tenant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKey {
    Id(i64),
    Code(NodeId),
    Path(TreePath),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Id(id) => write!(f, "id={}", id),
            NodeKey::Code(code) => write!(f, "code={}", code),
            NodeKey::Path(path) => write!(f, "path={}", path),
        }
    }
}

impl From<NodeId> for NodeKey {
    fn from(code: NodeId) -> Self {
        NodeKey::Code(code)
    }
}

impl From<TreePath> for NodeKey {
    fn from(path: TreePath) -> Self {
        NodeKey::Path(path)
    }
}

/// Parameters for creating a node under an existing parent path
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeParams {
    pub name: String,
    pub parent_path: TreePath,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
    #[serde(default = "empty_metadata")]
    pub metadata: Value,
}

fn empty_metadata() -> Value {
    json!({})
}

impl CreateNodeParams {
    pub fn new(name: impl Into<String>, parent_path: TreePath) -> Self {
        Self {
            name: name.into(),
            parent_path,
            owner: None,
            metadata: empty_metadata(),
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Partial update of the non-structural fields of a node
///
/// Structural fields (`code`, `path`, `parent_code`, `tenant`) cannot be
/// expressed here; they change only through create, move and delete.
///
/// `owner` uses the double-Option pattern:
/// - `None`: leave the owner untouched
/// - `Some(None)`: clear the owner
/// - `Some(Some(owner))`: set a new owner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub owner: Option<Option<OwnerRef>>,

    /// Replaces the metadata object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_owner(mut self, owner: Option<OwnerRef>) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.owner.is_none() && self.metadata.is_none()
    }

    /// Apply the update to a node in memory
    pub fn apply_to(&self, node: &mut TreeNode) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(owner) = &self.owner {
            node.owner = owner.clone();
        }
        if let Some(metadata) = &self.metadata {
            node.metadata = metadata.clone();
        }
        node.updated_at = Utc::now();
    }
}

/// One page of a paginated query plus the unpaginated match count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// A node with (some of) its children attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithChildren {
    pub node: TreeNode,
    pub children: Vec<NodeWithChildren>,
}

impl NodeWithChildren {
    pub fn leaf(node: TreeNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }
}
