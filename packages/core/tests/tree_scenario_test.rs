//! Tree Scenario Tests
//!
//! Integration tests for `TreeService` through the public API only.
//!
//! ## Test Coverage
//! - The organization chart walkthrough: root, two teams, a sub-team, a move
//! - Custom table naming loaded from JSON configuration
//! - Persistence across service restarts on the same database file
//! - Wire shape of serialized nodes

#[cfg(test)]
mod tree_scenario_tests {
    use anyhow::Result;
    use pathtree_core::config::TreeConfig;
    use pathtree_core::models::{CreateNodeParams, OwnerRef, TenantScope, TreePath};
    use pathtree_core::services::{TreeService, TreeServiceError};
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_service(temp_dir: &TempDir, config: TreeConfig) -> Result<TreeService> {
        Ok(TreeService::open(temp_dir.path().join("tree.db"), config).await?)
    }

    #[tokio::test]
    async fn test_organization_chart_walkthrough() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let service = open_service(&temp_dir, TreeConfig::default()).await?;
        let org = TenantScope::new("organizations", "acme")?;

        let root = service.get_root_node(&org).await?;
        let engineering = service
            .create_node(&org, CreateNodeParams::new("Engineering", root.path.clone()))
            .await?;
        let sales = service
            .create_node(&org, CreateNodeParams::new("Sales", root.path.clone()))
            .await?;
        let platform = service
            .create_node(
                &org,
                CreateNodeParams::new("Platform", engineering.path.clone())
                    .with_owner(OwnerRef::new("users", "alice")?),
            )
            .await?;

        let everyone = service.get_descendants(&org, &TreePath::root()).await?;
        assert_eq!(everyone.len(), 3);

        // Reorganize: Platform now reports to Sales
        let moved = service.move_node(&org, &platform.path, &sales.path).await?;
        assert_eq!(moved.path.parent()?, sales.path);

        let sales_children = service.get_children(&org, &sales.code).await?;
        assert_eq!(sales_children.len(), 1);
        assert_eq!(sales_children[0].code, platform.code);
        assert!(service.get_children(&org, &engineering.code).await?.is_empty());

        let ancestors = service.get_ancestors(&org, &moved.path).await?;
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].code, sales.code);

        // Engineering can go now that it is empty
        assert_eq!(service.delete_node(&org, &engineering.path, false).await?, 1);

        // Sales still has a sub-team
        let err = service
            .delete_node(&org, &sales.path, false)
            .await
            .unwrap_err();
        assert!(matches!(err, TreeServiceError::HasDescendants { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn test_custom_table_naming_from_json() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = TreeConfig::from_json_str(
            r#"{
                "table": {
                    "table_name": "org_units",
                    "path_column": "lineage",
                    "tenant_id_column": "account_id",
                    "tenant_type_column": "account_kind"
                },
                "root_name": "Company"
            }"#,
        )?;
        let service = open_service(&temp_dir, config).await?;
        let tenant = TenantScope::new("accounts", "7")?;

        let root = service.get_root_node(&tenant).await?;
        assert_eq!(root.name, "Company");

        let created = service
            .batch_create_nodes(
                &tenant,
                vec![
                    CreateNodeParams::new("North", TreePath::root()),
                    CreateNodeParams::new("South", TreePath::root()),
                ],
            )
            .await?;
        assert_eq!(created.len(), 2);

        let page = service.search_nodes(&tenant, "th", 10, 0).await?;
        assert_eq!(page.total, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_tree_survives_restart() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let tenant = TenantScope::new("organizations", "1")?;

        let (root_code, child_code) = {
            let service = open_service(&temp_dir, TreeConfig::default()).await?;
            let root = service.get_root_node(&tenant).await?;
            let child = service
                .create_node(&tenant, CreateNodeParams::new("kept", root.path.clone()))
                .await?;
            (root.code, child.code)
        };

        let service = open_service(&temp_dir, TreeConfig::default()).await?;
        let root = service.get_root_node(&tenant).await?;
        assert_eq!(root.code, root_code);

        let children = service.get_children(&tenant, &root.code).await?;
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].code, child_code);

        Ok(())
    }

    #[tokio::test]
    async fn test_serialized_node_shape() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let service = open_service(&temp_dir, TreeConfig::default()).await?;
        let tenant = TenantScope::new("organizations", "1")?;

        let root = service.get_root_node(&tenant).await?;
        let value = serde_json::to_value(&root)?;

        assert_eq!(value["path"], "/");
        assert_eq!(value["parentCode"], serde_json::Value::Null);
        assert_eq!(value["tenant"], json!({ "kind": "organizations", "id": "1" }));
        assert_eq!(value["metadata"], json!({ "isRoot": true }));
        assert!(value.get("owner").is_none());
        assert_eq!(value["code"].as_str().map(str::len), Some(26));

        Ok(())
    }
}
