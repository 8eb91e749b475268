//! Business Services
//!
//! This module contains the tree orchestration service:
//!
//! - `TreeService` - Root management, lookups, navigation, moves, deletes,
//!   batch creation and paginated queries over a `TreeStore`
//!
//! Services coordinate between the database layer and application logic,
//! enforcing tree invariants and running multi-row changes in transactions.

pub mod error;
pub mod tree_service;

pub use error::TreeServiceError;
pub use tree_service::TreeService;
