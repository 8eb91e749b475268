//! PathTree Core
//!
//! This crate stores hierarchies as materialized paths in a relational table,
//! with every tree isolated by a tenant scope.
//!
//! # Architecture
//!
//! - **Materialized paths**: each node stores its full ancestry (`/<code>/<code>`),
//!   so descendants are one prefix read and a subtree move is one prefix rewrite
//! - **Tenant scoping**: every store statement is filtered by `(tenant_type, tenant_id)`
//! - **libsql**: Embedded SQLite-compatible database
//! - **Soft delete**: deleted nodes are hidden from every query, never resurrected
//!
//! # Modules
//!
//! - [`models`] - Path algebra, node identifiers and the node record
//! - [`config`] - Table naming and service limits
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - The `TreeService` orchestrator

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, TableConfig, TreeConfig};
pub use models::*;
pub use services::*;
