//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - Idempotent schema setup with configurable table naming
//! - Tenant-scoped reads and writes through the `TreeStore` abstraction
//! - Explicit transactions for multi-row tree operations

mod database;
mod error;
mod libsql_store;
mod tree_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use libsql_store::{LibsqlTransaction, LibsqlTreeStore};
pub use tree_store::{TreeStore, TreeTransaction};
