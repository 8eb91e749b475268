//! Configuration for the tree table and the tree service
//!
//! Configuration is an explicit value handed to `DatabaseService::new` and
//! `TreeService::new`, validated once at construction. There is no global
//! default state; `Default` only produces a fresh value.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

// Table and column names are interpolated into SQL, so only plain
// identifiers are accepted.
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Upper bound for `insert_chunk_size` (SQLite's default variable limit is
/// 32766 and one row binds 11 values)
const MAX_INSERT_CHUNK_SIZE: usize = 2000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid table configuration: {0}")]
    InvalidTable(String),

    #[error("Invalid tree configuration: {0}")]
    InvalidTree(String),
}

/// Naming of the logical tree table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub table_name: String,
    pub path_column: String,
    pub tenant_id_column: String,
    pub tenant_type_column: String,
    pub owner_id_column: String,
    pub owner_type_column: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_name: "tree_nodes".to_string(),
            path_column: "path".to_string(),
            tenant_id_column: "tenant_id".to_string(),
            tenant_type_column: "tenant_type".to_string(),
            owner_id_column: "owner_id".to_string(),
            owner_type_column: "owner_type".to_string(),
        }
    }
}

/// Columns whose names are fixed by the store schema
const FIXED_COLUMNS: [&str; 7] = [
    "id",
    "code",
    "parent_code",
    "name",
    "metadata",
    "created_at",
    "updated_at",
];

impl TableConfig {
    /// Validate names: non-empty SQL identifiers, mutually distinct, and not
    /// colliding with the fixed columns
    pub fn validate(&self) -> Result<(), ConfigError> {
        static IDENTIFIER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
        let identifier = IDENTIFIER_REGEX
            .get_or_init(|| Regex::new(IDENTIFIER_PATTERN).ok())
            .as_ref()
            .ok_or_else(|| ConfigError::InvalidTable("identifier pattern failed to compile".into()))?;

        let named = [
            ("table_name", &self.table_name),
            ("path_column", &self.path_column),
            ("tenant_id_column", &self.tenant_id_column),
            ("tenant_type_column", &self.tenant_type_column),
            ("owner_id_column", &self.owner_id_column),
            ("owner_type_column", &self.owner_type_column),
        ];

        for (field, value) in named {
            if value.is_empty() {
                return Err(ConfigError::InvalidTable(format!("{} cannot be empty", field)));
            }
            if !identifier.is_match(value) {
                return Err(ConfigError::InvalidTable(format!(
                    "{} {:?} is not a plain SQL identifier",
                    field, value
                )));
            }
        }

        let mut seen: HashSet<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        seen.insert("deleted_at".to_string());
        for (field, value) in &named[1..] {
            if !seen.insert(value.to_ascii_lowercase()) {
                return Err(ConfigError::InvalidTable(format!(
                    "{} {:?} collides with another column",
                    field, value
                )));
            }
        }

        Ok(())
    }
}

/// Tree service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    pub table: TableConfig,

    /// Name given to lazily created root nodes
    pub root_name: String,

    /// SQLite busy timeout applied to every connection
    pub busy_timeout_ms: u64,

    /// Rows per INSERT statement in batch creation
    pub insert_chunk_size: usize,

    /// Upper bound applied to paginated queries
    pub max_page_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            root_name: "root".to_string(),
            busy_timeout_ms: 5000,
            insert_chunk_size: 100,
            max_page_size: 1000,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table.validate()?;

        if self.root_name.trim().is_empty() {
            return Err(ConfigError::InvalidTree("root_name cannot be empty".into()));
        }

        if self.insert_chunk_size == 0 || self.insert_chunk_size > MAX_INSERT_CHUNK_SIZE {
            return Err(ConfigError::InvalidTree(format!(
                "insert_chunk_size must be between 1 and {}",
                MAX_INSERT_CHUNK_SIZE
            )));
        }

        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidTree(
                "max_page_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Parse a JSON configuration document; missing fields take defaults
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ConfigError::InvalidTree(format!("malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TableConfig::default().validate().is_ok());
        assert!(TreeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_names_rejected() {
        let config = TableConfig {
            path_column: String::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTable(_))));
    }

    #[test]
    fn test_non_identifier_names_rejected() {
        let config = TableConfig {
            table_name: "nodes; DROP TABLE x".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TableConfig {
            tenant_id_column: "1tenant".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_colliding_columns_rejected() {
        let config = TableConfig {
            owner_id_column: "tenant_id".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TableConfig {
            path_column: "code".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tree_limits() {
        let config = TreeConfig {
            insert_chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTree(_))));

        let config = TreeConfig {
            max_page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config =
            TreeConfig::from_json_str(r#"{ "table": { "table_name": "org_tree" } }"#).unwrap();
        assert_eq!(config.table.table_name, "org_tree");
        assert_eq!(config.table.path_column, "path");
        assert_eq!(config.root_name, "root");
        assert_eq!(config.insert_chunk_size, 100);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        assert!(TreeConfig::from_json_str(r#"{ "root_name": "" }"#).is_err());
        assert!(TreeConfig::from_json_str("not json").is_err());
    }
}
