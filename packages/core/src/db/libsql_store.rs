//! libsql implementation of `TreeStore`
//!
//! Every statement built here starts from the tenant predicate and the
//! soft-delete predicate; `NodeFilter` fields are appended with AND. Values
//! are always bound as positional parameters. Only table and column names,
//! validated by `TableConfig::validate`, are interpolated.

use crate::config::TableConfig;
use crate::db::database::DatabaseService;
use crate::db::error::DatabaseError;
use crate::db::tree_store::{TreeStore, TreeTransaction};
use crate::models::{
    NodeFilter, NodeId, OrderBy, OwnerRef, TenantScope, TreeNode, TreePath, PATH_SEPARATOR,
    ROOT_PATH,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Value as SqlValue};
use std::collections::HashMap;
use std::sync::Arc;

/// Bound values per inserted row
const INSERT_COLUMNS: usize = 11;

/// Tree store backed by a local libsql database
#[derive(Debug, Clone)]
pub struct LibsqlTreeStore {
    db: Arc<DatabaseService>,
}

impl LibsqlTreeStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

#[async_trait]
impl TreeStore for LibsqlTreeStore {
    async fn find_nodes(
        &self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        query_nodes(&conn, &self.db.table, scope, filter).await
    }

    async fn count_nodes(
        &self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        query_count(&conn, &self.db.table, scope, filter).await
    }

    async fn insert_nodes(
        &self,
        nodes: &[TreeNode],
        chunk_size: usize,
    ) -> Result<Vec<i64>, DatabaseError> {
        if nodes.len() <= chunk_size {
            let conn = self.db.connect_with_timeout().await?;
            return insert_rows(&conn, &self.db.table, nodes, chunk_size).await;
        }

        // Several statements: keep them atomic
        let mut tx = self.begin().await?;
        match tx.insert_nodes(nodes, chunk_size).await {
            Ok(ids) => {
                tx.commit().await?;
                Ok(ids)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback after failed insert also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn begin(&self) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        // IMMEDIATE takes the write lock up front, so read-check-write
        // sequences inside the transaction cannot interleave with other writers
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(LibsqlTransaction {
            conn,
            db: self.db.clone(),
        }))
    }
}

/// An open `BEGIN IMMEDIATE` transaction on a dedicated connection
///
/// Dropping it without `commit()` closes the connection, which discards the
/// uncommitted work.
pub struct LibsqlTransaction {
    conn: Connection,
    db: Arc<DatabaseService>,
}

#[async_trait]
impl TreeTransaction for LibsqlTransaction {
    async fn find_nodes(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        query_nodes(&self.conn, &self.db.table, scope, filter).await
    }

    async fn count_nodes(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError> {
        query_count(&self.conn, &self.db.table, scope, filter).await
    }

    async fn insert_nodes(
        &mut self,
        nodes: &[TreeNode],
        chunk_size: usize,
    ) -> Result<Vec<i64>, DatabaseError> {
        insert_rows(&self.conn, &self.db.table, nodes, chunk_size).await
    }

    async fn update_node(
        &mut self,
        scope: &TenantScope,
        node: &TreeNode,
    ) -> Result<u64, DatabaseError> {
        let t = &self.db.table;
        let mut conditions = SqlConditions::scoped(t, scope);
        conditions.push("code = ?", [text(node.code.as_str())]);

        let mut values = vec![
            text(&node.name),
            text(node.path.as_str()),
            optional_text(node.parent_code.as_ref().map(|c| c.as_str())),
            optional_text(node.owner.as_ref().map(|o| o.owner_id())),
            optional_text(node.owner.as_ref().map(|o| o.owner_type())),
            text(&node.metadata.to_string()),
            text(&node.updated_at.to_rfc3339()),
        ];
        values.extend(conditions.params);

        let sql = format!(
            "UPDATE {table} SET name = ?, {path} = ?, parent_code = ?, {owner_id} = ?, {owner_type} = ?, metadata = ?, updated_at = ?{where_sql}",
            table = t.table_name,
            path = t.path_column,
            owner_id = t.owner_id_column,
            owner_type = t.owner_type_column,
            where_sql = where_sql(&conditions.clauses),
        );

        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::from_statement("Failed to update node", e))
    }

    async fn rebase_descendants(
        &mut self,
        scope: &TenantScope,
        from: &TreePath,
        to: &TreePath,
    ) -> Result<u64, DatabaseError> {
        let t = &self.db.table;
        let conditions =
            SqlConditions::for_filter(t, scope, &NodeFilter::new().with_descendants_of(from.clone()));

        // Keep everything from the separator that follows `from` (1-based, in characters)
        let (prefix, keep_from) = match (from.is_root(), to.is_root()) {
            (true, true) => return Ok(0),
            (true, false) => (to.as_str(), 1),
            (false, true) => ("", from.as_str().chars().count() + 1),
            (false, false) => (to.as_str(), from.as_str().chars().count() + 1),
        };

        let mut values = vec![
            text(prefix),
            SqlValue::Integer(keep_from as i64),
            text(&Utc::now().to_rfc3339()),
        ];
        values.extend(conditions.params);

        let sql = format!(
            "UPDATE {table} SET {path} = ? || SUBSTR({path}, ?), updated_at = ?{where_sql}",
            table = t.table_name,
            path = t.path_column,
            where_sql = where_sql(&conditions.clauses),
        );

        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| {
                DatabaseError::from_statement(&format!("Failed to rebase descendants of {}", from), e)
            })
    }

    async fn soft_delete(
        &mut self,
        scope: &TenantScope,
        filter: &NodeFilter,
    ) -> Result<u64, DatabaseError> {
        let t = &self.db.table;
        let conditions = SqlConditions::for_filter(t, scope, filter);

        let mut values = vec![text(&Utc::now().to_rfc3339())];
        values.extend(conditions.params);

        let sql = format!(
            "UPDATE {table} SET deleted_at = ?{where_sql}",
            table = t.table_name,
            where_sql = where_sql(&conditions.clauses),
        );

        self.conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to soft-delete nodes: {}", e)))
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("COMMIT", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::transaction_failed(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}

/// WHERE clause fragments and their bound values, in order
struct SqlConditions {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl SqlConditions {
    /// Tenant and liveness predicates shared by every statement
    fn scoped(t: &TableConfig, scope: &TenantScope) -> Self {
        Self {
            clauses: vec![
                format!("{} = ?", t.tenant_id_column),
                format!("{} = ?", t.tenant_type_column),
                "deleted_at IS NULL".to_string(),
            ],
            params: vec![text(scope.tenant_id()), text(scope.tenant_type())],
        }
    }

    fn for_filter(t: &TableConfig, scope: &TenantScope, filter: &NodeFilter) -> Self {
        let mut conditions = Self::scoped(t, scope);
        let path = t.path_column.as_str();

        if let Some(id) = filter.id {
            conditions.push("id = ?", [SqlValue::Integer(id)]);
        }

        if let Some(codes) = &filter.codes {
            conditions.push_in("code", codes.iter().map(|c| text(c.as_str())).collect());
        }

        if let Some(paths) = &filter.paths {
            conditions.push_in(path, paths.iter().map(|p| text(p.as_str())).collect());
        }

        if let Some(parent_code) = &filter.parent_code {
            conditions.push("parent_code = ?", [text(parent_code.as_str())]);
        }

        if let Some(ancestor) = &filter.descendants_of {
            conditions.push(
                format!("{path} LIKE ? ESCAPE '\\' AND {path} != ?"),
                [text(&descendant_pattern(ancestor)), text(ancestor.as_str())],
            );
        }

        if let Some(top) = &filter.subtree_of {
            conditions.push(
                format!("({path} = ? OR {path} LIKE ? ESCAPE '\\')"),
                [text(top.as_str()), text(&descendant_pattern(top))],
            );
        }

        if let Some(needle) = &filter.name_contains {
            conditions.push(
                "name LIKE ? ESCAPE '\\'",
                [text(&format!("%{}%", escape_like(needle)))],
            );
        }

        if let Some(owner) = &filter.owner {
            conditions.push(
                format!("{} = ? AND {} = ?", t.owner_id_column, t.owner_type_column),
                [text(owner.owner_id()), text(owner.owner_type())],
            );
        }

        match filter.depth {
            Some(0) => conditions.push(format!("{path} = ?"), [text(ROOT_PATH)]),
            Some(depth) => conditions.push(
                // Segment count = separator count, except for the root itself
                format!("{path} != ? AND (LENGTH({path}) - LENGTH(REPLACE({path}, ?, ''))) = ?"),
                [
                    text(ROOT_PATH),
                    text(&PATH_SEPARATOR.to_string()),
                    SqlValue::Integer(depth as i64),
                ],
            ),
            None => {}
        }

        conditions
    }

    fn push<I>(&mut self, clause: impl Into<String>, params: I)
    where
        I: IntoIterator<Item = SqlValue>,
    {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    fn push_in(&mut self, column: &str, values: Vec<SqlValue>) {
        if values.is_empty() {
            // An empty set matches nothing
            self.clauses.push("0 = 1".to_string());
            return;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        self.push(format!("{} IN ({})", column, placeholders), values);
    }
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn order_and_page_sql(t: &TableConfig, filter: &NodeFilter, params: &mut Vec<SqlValue>) -> String {
    let mut sql = match filter.order_by.unwrap_or_default() {
        OrderBy::IdAsc => " ORDER BY id ASC".to_string(),
        OrderBy::PathAsc => format!(" ORDER BY {} ASC, id ASC", t.path_column),
    };

    match (filter.limit, filter.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlValue::Integer(limit as i64));
            params.push(SqlValue::Integer(offset.unwrap_or(0) as i64));
        }
        (None, Some(offset)) => {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            sql.push_str(" LIMIT -1 OFFSET ?");
            params.push(SqlValue::Integer(offset as i64));
        }
        (None, None) => {}
    }

    sql
}

/// Escape LIKE wildcards so `raw` matches literally under `ESCAPE '\'`
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// `TreePath::prefix_pattern` with the path part escaped
fn descendant_pattern(path: &TreePath) -> String {
    if path.is_root() {
        path.prefix_pattern()
    } else {
        format!("{}{}%", escape_like(path.as_str()), PATH_SEPARATOR)
    }
}

fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

fn optional_text(value: Option<&str>) -> SqlValue {
    value.map(text).unwrap_or(SqlValue::Null)
}

fn select_columns(t: &TableConfig) -> String {
    format!(
        "id, code, name, {}, parent_code, {}, {}, {}, {}, metadata, created_at, updated_at",
        t.path_column,
        t.tenant_id_column,
        t.tenant_type_column,
        t.owner_id_column,
        t.owner_type_column
    )
}

async fn query_nodes(
    conn: &Connection,
    t: &TableConfig,
    scope: &TenantScope,
    filter: &NodeFilter,
) -> Result<Vec<TreeNode>, DatabaseError> {
    let SqlConditions {
        clauses,
        mut params,
    } = SqlConditions::for_filter(t, scope, filter);
    let tail = order_and_page_sql(t, filter, &mut params);

    let sql = format!(
        "SELECT {} FROM {}{}{}",
        select_columns(t),
        t.table_name,
        where_sql(&clauses),
        tail
    );

    let mut stmt = conn.prepare(&sql).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to prepare node query: {}", e))
    })?;
    let mut rows = stmt
        .query(Params::Positional(params))
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to query nodes: {}", e)))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to read node row: {}", e)))?
    {
        nodes.push(row_to_node(&row)?);
    }

    Ok(nodes)
}

async fn query_count(
    conn: &Connection,
    t: &TableConfig,
    scope: &TenantScope,
    filter: &NodeFilter,
) -> Result<u64, DatabaseError> {
    let conditions = SqlConditions::for_filter(t, scope, filter);
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        t.table_name,
        where_sql(&conditions.clauses)
    );

    let mut stmt = conn.prepare(&sql).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to prepare count query: {}", e))
    })?;
    let mut rows = stmt
        .query(Params::Positional(conditions.params))
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to count nodes: {}", e)))?;

    let count: i64 = match rows.next().await? {
        Some(row) => row.get(0)?,
        None => 0,
    };

    Ok(count.max(0) as u64)
}

/// Multi-row INSERT per chunk; ids come back through RETURNING and are
/// matched to the input by code
async fn insert_rows(
    conn: &Connection,
    t: &TableConfig,
    nodes: &[TreeNode],
    chunk_size: usize,
) -> Result<Vec<i64>, DatabaseError> {
    let mut ids_by_code: HashMap<String, i64> = HashMap::with_capacity(nodes.len());

    for chunk in nodes.chunks(chunk_size.max(1)) {
        let row_placeholders = format!("({})", vec!["?"; INSERT_COLUMNS].join(", "));
        let sql = format!(
            "INSERT INTO {table} (code, parent_code, {path}, name, {tenant_id}, {tenant_type}, {owner_id}, {owner_type}, metadata, created_at, updated_at) VALUES {rows} RETURNING id, code",
            table = t.table_name,
            path = t.path_column,
            tenant_id = t.tenant_id_column,
            tenant_type = t.tenant_type_column,
            owner_id = t.owner_id_column,
            owner_type = t.owner_type_column,
            rows = vec![row_placeholders.as_str(); chunk.len()].join(", "),
        );

        let mut values = Vec::with_capacity(chunk.len() * INSERT_COLUMNS);
        for node in chunk {
            values.extend([
                text(node.code.as_str()),
                optional_text(node.parent_code.as_ref().map(|c| c.as_str())),
                text(node.path.as_str()),
                text(&node.name),
                text(node.tenant.tenant_id()),
                text(node.tenant.tenant_type()),
                optional_text(node.owner.as_ref().map(|o| o.owner_id())),
                optional_text(node.owner.as_ref().map(|o| o.owner_type())),
                text(&node.metadata.to_string()),
                text(&node.created_at.to_rfc3339()),
                text(&node.updated_at.to_rfc3339()),
            ]);
        }

        let context = format!("Failed to insert {} node(s)", chunk.len());
        let mut rows = conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::from_statement(&context, e))?;

        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::from_statement(&context, e))?
        {
            let id: i64 = row.get(0)?;
            let code: String = row.get(1)?;
            ids_by_code.insert(code, id);
        }
    }

    nodes
        .iter()
        .map(|node| {
            ids_by_code.get(node.code.as_str()).copied().ok_or_else(|| {
                DatabaseError::sql_execution(format!("No id returned for node {}", node.code))
            })
        })
        .collect()
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    // Try SQLite format first: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::row_decode(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    )))
}

/// Convert a libsql row (in `select_columns` order) into a `TreeNode`
fn row_to_node(row: &libsql::Row) -> Result<TreeNode, DatabaseError> {
    let id: i64 = row.get(0)?;
    let code: String = row.get(1)?;
    let name: String = row.get(2)?;
    let path: String = row.get(3)?;
    let parent_code: Option<String> = row.get(4)?;
    let tenant_id: String = row.get(5)?;
    let tenant_type: String = row.get(6)?;
    let owner_id: Option<String> = row.get(7)?;
    let owner_type: Option<String> = row.get(8)?;
    let metadata: String = row.get(9)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    let decode = |what: &str, e: &dyn std::fmt::Display| {
        DatabaseError::row_decode(format!("row {}: invalid {}: {}", id, what, e))
    };

    let owner = match (owner_type, owner_id) {
        (Some(owner_type), Some(owner_id)) => {
            Some(OwnerRef::new(owner_type, owner_id).map_err(|e| decode("owner", &e))?)
        }
        (None, None) => None,
        _ => return Err(decode("owner", &"half-set owner reference")),
    };

    Ok(TreeNode {
        id,
        code: NodeId::parse(code).map_err(|e| decode("code", &e))?,
        name,
        path: TreePath::parse(path).map_err(|e| decode("path", &e))?,
        parent_code: parent_code
            .map(NodeId::parse)
            .transpose()
            .map_err(|e| decode("parent_code", &e))?,
        tenant: TenantScope::new(tenant_type, tenant_id).map_err(|e| decode("tenant", &e))?,
        owner,
        metadata: serde_json::from_str(&metadata).map_err(|e| decode("metadata", &e))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::models::{IdSource, UlidSource};
    use serde_json::json;
    use tempfile::TempDir;

    async fn create_test_store() -> (LibsqlTreeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"), &TreeConfig::default())
            .await
            .unwrap();
        (LibsqlTreeStore::new(Arc::new(db)), temp_dir)
    }

    fn scope(id: &str) -> TenantScope {
        TenantScope::new("organizations", id).unwrap()
    }

    /// root -> a -> c, root -> b
    async fn seed(store: &LibsqlTreeStore, tenant: &TenantScope) -> [TreeNode; 4] {
        let ids = UlidSource::new();
        let root = TreeNode::new_root(ids.new_id(), tenant.clone(), "root");
        let a = TreeNode::new_child(ids.new_id(), "Alpha", &root, None, json!({})).unwrap();
        let b = TreeNode::new_child(
            ids.new_id(),
            "Beta_50%",
            &root,
            Some(OwnerRef::new("users", "7").unwrap()),
            json!({"k": 1}),
        )
        .unwrap();
        let c = TreeNode::new_child(ids.new_id(), "Charlie", &a, None, json!({})).unwrap();

        let mut nodes = [root, a, b, c];
        let row_ids = store.insert_nodes(&nodes, 100).await.unwrap();
        for (node, id) in nodes.iter_mut().zip(row_ids) {
            node.id = id;
        }
        nodes
    }

    fn codes(nodes: &[TreeNode]) -> Vec<String> {
        nodes.iter().map(|n| n.code.to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, c] = seed(&store, &tenant).await;

        assert!(root.id > 0);
        assert!(a.id > root.id && b.id > a.id && c.id > b.id);

        let found = store
            .find_node(&tenant, &NodeFilter::new().with_code(b.code.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.id);
        assert_eq!(found.path, b.path);
        assert_eq!(found.parent_code, Some(root.code.clone()));
        assert_eq!(found.owner, b.owner);
        assert_eq!(found.metadata, json!({"k": 1}));
        assert_eq!(found.created_at.timestamp(), b.created_at.timestamp());
    }

    #[tokio::test]
    async fn test_descendant_and_subtree_filters() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, c] = seed(&store, &tenant).await;

        let all = store
            .find_nodes(&tenant, &NodeFilter::new().with_descendants_of(root.path.clone()))
            .await
            .unwrap();
        assert_eq!(codes(&all), codes(&[a.clone(), b.clone(), c.clone()]));

        let under_a = store
            .find_nodes(&tenant, &NodeFilter::new().with_descendants_of(a.path.clone()))
            .await
            .unwrap();
        assert_eq!(codes(&under_a), codes(&[c.clone()]));

        let subtree_a = store
            .count_nodes(&tenant, &NodeFilter::new().with_subtree_of(a.path.clone()))
            .await
            .unwrap();
        assert_eq!(subtree_a, 2);
    }

    #[tokio::test]
    async fn test_depth_filter_excludes_root() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, c] = seed(&store, &tenant).await;

        let depth_one = store
            .find_nodes(&tenant, &NodeFilter::new().with_depth(1))
            .await
            .unwrap();
        assert_eq!(codes(&depth_one), codes(&[a, b]));

        let depth_two = store
            .find_nodes(&tenant, &NodeFilter::new().with_depth(2))
            .await
            .unwrap();
        assert_eq!(codes(&depth_two), codes(&[c]));

        let depth_zero = store
            .find_nodes(&tenant, &NodeFilter::new().with_depth(0))
            .await
            .unwrap();
        assert_eq!(codes(&depth_zero), codes(&[root]));
    }

    #[tokio::test]
    async fn test_name_search_treats_wildcards_literally() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [_, _, b, _] = seed(&store, &tenant).await;

        let hits = store
            .find_nodes(&tenant, &NodeFilter::new().with_name_contains("a_50%"))
            .await
            .unwrap();
        assert_eq!(codes(&hits), codes(&[b]));

        // '_' alone must not behave as a single-character wildcard
        let none = store
            .count_nodes(&tenant, &NodeFilter::new().with_name_contains("lph_"))
            .await
            .unwrap();
        assert_eq!(none, 0);

        let case_insensitive = store
            .count_nodes(&tenant, &NodeFilter::new().with_name_contains("ALPHA"))
            .await
            .unwrap();
        assert_eq!(case_insensitive, 1);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let other = scope("2");
        let [_, a, _, _] = seed(&store, &tenant).await;

        let leaked = store
            .find_node(&other, &NodeFilter::new().with_code(a.code.clone()))
            .await
            .unwrap();
        assert!(leaked.is_none());
        assert_eq!(store.count_nodes(&other, &NodeFilter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pagination_and_ordering() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, c] = seed(&store, &tenant).await;

        let page = store
            .find_nodes(&tenant, &NodeFilter::new().with_limit(2).with_offset(1))
            .await
            .unwrap();
        assert_eq!(codes(&page), codes(&[a.clone(), b.clone()]));

        let tail = store
            .find_nodes(&tenant, &NodeFilter::new().with_offset(3))
            .await
            .unwrap();
        assert_eq!(codes(&tail), codes(&[c.clone()]));

        let by_path = store
            .find_nodes(&tenant, &NodeFilter::new().with_order_by(OrderBy::PathAsc))
            .await
            .unwrap();
        assert_eq!(by_path[0].code, root.code);
        let pos_a = by_path.iter().position(|n| n.code == a.code).unwrap();
        let pos_c = by_path.iter().position(|n| n.code == c.code).unwrap();
        assert!(pos_a < pos_c);
    }

    #[tokio::test]
    async fn test_empty_code_set_matches_nothing() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        seed(&store, &tenant).await;

        let none = store
            .find_nodes(&tenant, &NodeFilter::new().with_codes(Vec::new()))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_live_path_is_unique_violation() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        seed(&store, &tenant).await;

        let second_root = TreeNode::new_root(UlidSource::new().new_id(), tenant.clone(), "root");
        let err = store.insert_nodes(&[second_root], 100).await.unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_rows_and_frees_path() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, _] = seed(&store, &tenant).await;

        let mut tx = store.begin().await.unwrap();
        let deleted = tx
            .soft_delete(&tenant, &NodeFilter::new().with_subtree_of(a.path.clone()))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.find_nodes(&tenant, &NodeFilter::new()).await.unwrap();
        assert_eq!(codes(&remaining), codes(&[root.clone(), b]));

        // A soft-deleted root no longer occupies "/"
        let mut tx = store.begin().await.unwrap();
        tx.soft_delete(&tenant, &NodeFilter::new().with_path(root.path.clone()))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        let new_root = TreeNode::new_root(UlidSource::new().new_id(), tenant.clone(), "root");
        assert!(store.insert_nodes(&[new_root], 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [_, a, b, c] = seed(&store, &tenant).await;

        let mut tx = store.begin().await.unwrap();
        let target = b.path.append_segment(a.code.as_str()).unwrap();
        assert_eq!(tx.rebase_descendants(&tenant, &a.path, &target).await.unwrap(), 1);

        // Visible inside the transaction
        let inside = tx
            .find_node(&tenant, &NodeFilter::new().with_code(c.code.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inside.path, c.path.rebase(&a.path, &target).unwrap());
        tx.rollback().await.unwrap();

        let after = store
            .find_node(&tenant, &NodeFilter::new().with_code(c.code.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.path, c.path);
    }

    #[tokio::test]
    async fn test_rebase_descendants_rewrites_whole_subtree() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [root, a, b, c] = seed(&store, &tenant).await;

        let d = TreeNode::new_child(UlidSource::new().new_id(), "Delta", &c, None, json!({})).unwrap();
        store.insert_nodes(std::slice::from_ref(&d), 100).await.unwrap();

        // Same codes in another tenant must not be touched
        let other = scope("2");
        let mut foreign = c.clone();
        foreign.tenant = other.clone();
        foreign.code = UlidSource::new().new_id();
        store.insert_nodes(&[foreign.clone()], 100).await.unwrap();

        let target = b.path.append_segment(a.code.as_str()).unwrap();
        let mut tx = store.begin().await.unwrap();
        let rewritten = tx.rebase_descendants(&tenant, &a.path, &target).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(rewritten, 2);

        let nodes = store
            .find_nodes(&tenant, &NodeFilter::new().with_order_by(OrderBy::IdAsc))
            .await
            .unwrap();
        let path_of = |code: &NodeId| {
            nodes
                .iter()
                .find(|n| &n.code == code)
                .map(|n| n.path.clone())
                .unwrap()
        };

        assert_eq!(path_of(&c.code), c.path.rebase(&a.path, &target).unwrap());
        assert_eq!(path_of(&d.code), d.path.rebase(&a.path, &target).unwrap());
        // The subtree top and everything outside it keep their paths
        assert_eq!(path_of(&a.code), a.path);
        assert_eq!(path_of(&b.code), b.path);
        assert_eq!(path_of(&root.code), root.path);

        let untouched = store
            .find_node(&other, &NodeFilter::new().with_code(foreign.code.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(untouched.path, foreign.path);
    }

    #[tokio::test]
    async fn test_rebase_descendants_to_root() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [_, a, _, c] = seed(&store, &tenant).await;

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.rebase_descendants(&tenant, &a.path, &TreePath::root()).await.unwrap(),
            1
        );
        let lifted = tx
            .find_node(&tenant, &NodeFilter::new().with_code(c.code.clone()))
            .await
            .unwrap()
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(lifted.path.as_str(), format!("/{}", c.code));
    }

    #[tokio::test]
    async fn test_update_node_writes_mutable_columns() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let [_, _, mut b, _] = seed(&store, &tenant).await;

        b.name = "Renamed".to_string();
        b.owner = None;
        b.metadata = json!({"color": "red"});

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.update_node(&tenant, &b).await.unwrap(), 1);
        // Wrong tenant touches nothing
        assert_eq!(tx.update_node(&scope("2"), &b).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let stored = store
            .find_node(&tenant, &NodeFilter::new().with_id(b.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Renamed");
        assert!(stored.owner.is_none());
        assert_eq!(stored.metadata["color"], "red");
    }

    #[tokio::test]
    async fn test_chunked_insert_returns_ids_in_order() {
        let (store, _temp_dir) = create_test_store().await;
        let tenant = scope("1");
        let ids = UlidSource::new();
        let root = TreeNode::new_root(ids.new_id(), tenant.clone(), "root");
        store.insert_nodes(&[root.clone()], 10).await.unwrap();

        let children: Vec<TreeNode> = (0..7)
            .map(|i| {
                TreeNode::new_child(ids.new_id(), format!("n{}", i), &root, None, json!({}))
                    .unwrap()
            })
            .collect();
        let row_ids = store.insert_nodes(&children, 3).await.unwrap();
        assert_eq!(row_ids.len(), 7);

        for (child, id) in children.iter().zip(&row_ids) {
            let stored = store
                .find_node(&tenant, &NodeFilter::new().with_id(*id))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.code, child.code);
        }
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-02 03:04:05").is_ok());
        assert!(parse_timestamp("2025-01-02T03:04:05+00:00").is_ok());
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(DatabaseError::RowDecodeFailed { .. })
        ));
    }

    #[test]
    fn test_descendant_pattern_escapes_wildcards() {
        assert_eq!(descendant_pattern(&TreePath::root()), "%");
        assert_eq!(
            descendant_pattern(&TreePath::parse("/a_b/c").unwrap()),
            "/a\\_b/c/%"
        );
    }
}
