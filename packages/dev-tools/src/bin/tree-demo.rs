//! Tree Demo Binary
//!
//! Walks a small organization chart through the tree service against a real
//! database file: lazy root creation, child creation, a subtree move and the
//! resulting descendant and child listings.
//!
//! # Usage
//!
//! ```bash
//! # Default database at ./data/tree-demo.db
//! cargo run --bin tree-demo
//!
//! # Custom database and configuration
//! TREE_DEMO_DB=/tmp/demo.db TREE_DEMO_CONFIG=./tree.json cargo run --bin tree-demo
//! ```
//!
//! # Environment Variables
//!
//! - `TREE_DEMO_DB`: Database file (default: `./data/tree-demo.db`)
//! - `TREE_DEMO_CONFIG`: Optional JSON file with a `TreeConfig`
//! - `TREE_DEMO_TENANT`: Tenant id (default: a fresh one per run)
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::env;
use std::path::PathBuf;

use pathtree_core::config::TreeConfig;
use pathtree_core::models::{CreateNodeParams, IdSource, TenantScope, TreeNode, TreePath, UlidSource};
use pathtree_core::services::TreeService;
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("🌳 PathTree Demo");
    tracing::info!("==================================");

    let db_path: PathBuf = env::var("TREE_DEMO_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./data/tree-demo.db"));

    let config = match env::var("TREE_DEMO_CONFIG") {
        Ok(config_path) => {
            let raw = tokio::fs::read_to_string(&config_path).await?;
            TreeConfig::from_json_str(&raw)?
        }
        Err(_) => TreeConfig::default(),
    };

    tracing::info!("📦 Database: {}", db_path.display());
    tracing::info!("📋 Table: {}", config.table.table_name);

    let service = TreeService::open(db_path, config).await?;

    // A fresh tenant per run keeps repeated runs independent
    let tenant_id = env::var("TREE_DEMO_TENANT")
        .unwrap_or_else(|_| UlidSource::new().new_id().to_string());
    let tenant = TenantScope::new("organizations", tenant_id)?;
    tracing::info!("🏢 Tenant: {}", tenant);

    let root = service.get_root_node(&tenant).await?;
    let a = service
        .create_node(&tenant, CreateNodeParams::new("A", root.path.clone()))
        .await?;
    let b = service
        .create_node(&tenant, CreateNodeParams::new("B", root.path.clone()))
        .await?;
    let c = service
        .create_node(&tenant, CreateNodeParams::new("C", a.path.clone()))
        .await?;

    let descendants = service.get_descendants(&tenant, &TreePath::root()).await?;
    tracing::info!("Descendants of / before the move:");
    print_nodes(&descendants);

    let moved = service.move_node(&tenant, &c.path, &b.path).await?;
    tracing::info!("✅ Moved C: {} -> {}", c.path, moved.path);

    let children = service.get_children(&tenant, &b.code).await?;
    tracing::info!("Children of B after the move:");
    print_nodes(&children);

    let summary = json!({
        "tenant": tenant,
        "root": root,
        "descendants": service.get_descendants(&tenant, &TreePath::root()).await?,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn print_nodes(nodes: &[TreeNode]) {
    for node in nodes {
        tracing::info!("  {:<4} {}", node.name, node.path);
    }
}
