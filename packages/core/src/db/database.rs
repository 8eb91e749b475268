//! Database Connection Management
//!
//! This module provides the libsql connection and the idempotent schema setup
//! for the tree table.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Configurable naming**: table and scope columns come from `TableConfig`
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Partial unique index**: `(tenant, path)` is unique among live rows only,
//!   so a soft-deleted root never blocks a new one
//!
//! # Database Connection Patterns
//!
//! Use `connect_with_timeout()` in async functions. It applies the configured
//! busy timeout so concurrent writers wait instead of failing immediately with
//! `SQLITE_BUSY`.
//!
//! ```no_run
//! # use pathtree_core::db::DatabaseService;
//! # use pathtree_core::config::TreeConfig;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseService::new(PathBuf::from("./data/tree.db"), &TreeConfig::default()).await?;
//! let conn = db.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{TableConfig, TreeConfig};
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    /// Naming of the tree table
    pub table: TableConfig,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Validate the table configuration
    /// 2. Ensure the parent directory exists (create if needed)
    /// 3. Open/create the database file
    /// 4. Initialize the schema (CREATE TABLE/INDEX IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The table configuration is invalid
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf, config: &TreeConfig) -> Result<Self, DatabaseError> {
        config.validate()?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            table: config.table.clone(),
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema().await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() instead of
    /// execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema
    ///
    /// Idempotent: safe to call on every start.
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        let t = &self.table;
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    code TEXT NOT NULL UNIQUE,
                    parent_code TEXT,
                    {path} TEXT NOT NULL,
                    name TEXT NOT NULL,
                    {tenant_id} TEXT NOT NULL,
                    {tenant_type} TEXT NOT NULL,
                    {owner_id} TEXT,
                    {owner_type} TEXT,
                    metadata JSON NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT,
                    -- owner is a tagged reference: both halves or neither
                    CHECK (({owner_id} IS NULL) = ({owner_type} IS NULL)),
                    FOREIGN KEY (parent_code) REFERENCES {table}(code)
                )",
                table = t.table_name,
                path = t.path_column,
                tenant_id = t.tenant_id_column,
                tenant_type = t.tenant_type_column,
                owner_id = t.owner_id_column,
                owner_type = t.owner_type_column,
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create table '{}': {}",
                t.table_name, e
            ))
        })?;

        self.create_indexes(&conn).await?;

        Ok(())
    }

    /// Create the indexes backing scoped, path and parent lookups
    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let t = &self.table;
        let statements = [
            // One live node per (tenant, path); enforces the single root per tenant
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_tenant_path ON {table} ({tid}, {ttype}, {path}) WHERE deleted_at IS NULL",
                table = t.table_name,
                tid = t.tenant_id_column,
                ttype = t.tenant_type_column,
                path = t.path_column,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_tenant ON {table} ({tid}, {ttype})",
                table = t.table_name,
                tid = t.tenant_id_column,
                ttype = t.tenant_type_column,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_owner ON {table} ({oid}, {otype})",
                table = t.table_name,
                oid = t.owner_id_column,
                otype = t.owner_type_column,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_parent ON {table} (parent_code)",
                table = t.table_name,
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{path} ON {table} ({path})",
                table = t.table_name,
                path = t.path_column,
            ),
        ];

        for (i, sql) in statements.iter().enumerate() {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index #{}: {}",
                    i + 1,
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Get a connection without configuring it
    ///
    /// Prefer `connect_with_timeout()` in async code.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with the configured busy timeout and foreign keys on
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Flush the WAL before shutdown
    pub async fn close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}
