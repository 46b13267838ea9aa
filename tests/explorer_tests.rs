//! Explorer End-to-End Tests
//!
//! Builds the full browse tree from a JSON inventory written to a temp dir and
//! checks rendering, search aggregation, search-hit wrapping and the post-mutation
//! commands.

mod common;

use common::{config, context, inventory_file, names, Script, ScriptedProvider, VAULT_TYPE};
use cloudtree::app::config::{CategoryConfig, ExplorerConfig};
use cloudtree::app::resource_explorer::{
    apply_created, available_commands, expand, portal_url, refresh_ancestor, DefaultNodeFactory,
    ExplorerContext, InventorySnapshot, LoadOutcome, Node, NodeCommand, NodeKind,
    ResourceDescriptor, ResourceExplorer, ResourceKind, SearchAggregator, SearchMatch, Scope,
    SnapshotProvider, TreeNode, TreeRenderer,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn explorer_with(provider: SnapshotProvider, config: ExplorerConfig) -> ResourceExplorer {
    let provider = Arc::new(provider);
    let accounts = provider.account_labels();
    let ctx = ExplorerContext::new(
        provider.clone(),
        provider,
        Arc::new(DefaultNodeFactory),
        config,
    );
    ResourceExplorer::new(ctx, &accounts)
}

fn explorer(path: &Path) -> ResourceExplorer {
    let snapshot = InventorySnapshot::load_from_path(path).unwrap();
    explorer_with(SnapshotProvider::new(snapshot), ExplorerConfig::default())
}

fn find_path(root: &Node, labels: &[&str]) -> Node {
    let mut current = root.clone();
    for label in labels {
        current = current
            .find_child(|child| child.label() == *label)
            .unwrap_or_else(|| panic!("no child '{}' under '{}'", label, current.label()));
    }
    current
}

// ============================================================================
// Browse
// ============================================================================

#[tokio::test]
async fn test_browse_renders_expanded_tree() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);

    let stats = explorer
        .expand_all(4, &CancellationToken::new())
        .await
        .unwrap();

    let expected = "\
v Contoso
  v Production (Enabled)
    v rg-web (westeurope)
      v Virtual Machines
      v Storage Accounts
      v Web Apps
        > web-frontend (Running)
      v Key Vaults
        - kv-orders
      v SQL Servers
        > sql-main (Ready)
      v Virtual Networks
v Fabrikam
  v Dev
    v rg-data
      v Virtual Machines
      v Storage Accounts
      v Web Apps
      v Key Vaults
        - vault-orders-dev
      v SQL Servers
      v Virtual Networks
";
    assert_eq!(TreeRenderer::new().render(explorer.root()), expected);
    assert_eq!(stats.failed, 0);
    // 2 accounts, 2 subscriptions, 2 groups, 12 categories
    assert_eq!(stats.expanded, 18);
}

#[test]
fn test_browse_root_is_a_plain_root() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);

    assert!(matches!(explorer.root().kind(), NodeKind::Root));
    assert_eq!(explorer.root().label(), "Accounts");
    assert!(explorer.root().is_loaded());
    assert_eq!(explorer.root().child_labels(), vec!["Contoso", "Fabrikam"]);
}

#[tokio::test]
async fn test_browse_filter_keeps_matching_branches() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);
    explorer
        .expand_all(4, &CancellationToken::new())
        .await
        .unwrap();

    let rendered = TreeRenderer::new()
        .with_filter("sql-main")
        .render(explorer.root());

    let expected = "\
v Contoso
  v Production (Enabled)
    v rg-web (westeurope)
      v SQL Servers
        > sql-main (Ready)
";
    assert_eq!(rendered, expected);
}

#[tokio::test]
async fn test_injected_failure_shows_error_under_category_only() {
    let (_dir, path) = inventory_file();
    let snapshot = InventorySnapshot::load_from_path(&path).unwrap();
    let provider =
        SnapshotProvider::new(snapshot).with_failure(VAULT_TYPE, "vault listing disabled");
    let explorer = explorer_with(provider, ExplorerConfig::default());

    let stats = explorer
        .expand_all(4, &CancellationToken::new())
        .await
        .unwrap();

    let vaults = find_path(explorer.root(), &["Contoso", "Production", "rg-web", "Key Vaults"]);
    assert_eq!(vaults.child_labels(), vec!["Error: vault listing disabled"]);
    let sql = find_path(explorer.root(), &["Contoso", "Production", "rg-web", "SQL Servers"]);
    assert_eq!(sql.child_labels(), vec!["sql-main"]);
    assert_eq!(stats.failed, 0, "failures were absorbed during preload");
}

#[tokio::test]
async fn test_config_file_controls_categories() {
    let (dir, path) = inventory_file();
    let config_path = dir.path().join("config.toml");
    ExplorerConfig {
        categories: vec![CategoryConfig::new("Vaults", VAULT_TYPE)],
        ..Default::default()
    }
    .save_to_path(&config_path)
    .unwrap();

    let config = ExplorerConfig::load_from_path(&config_path).unwrap();
    let snapshot = InventorySnapshot::load_from_path(&path).unwrap();
    let explorer = explorer_with(SnapshotProvider::new(snapshot), config);
    explorer
        .expand_all(3, &CancellationToken::new())
        .await
        .unwrap();

    let group = find_path(explorer.root(), &["Contoso", "Production", "rg-web"]);
    assert_eq!(group.child_labels(), vec!["Vaults"]);
    assert_eq!(find_path(&group, &["Vaults"]).child_labels(), vec!["kv-orders"]);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_groups_matches_by_account_and_subscription() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);

    let (results, summary) = explorer
        .search("ORDERS", &CancellationToken::new())
        .await
        .unwrap();

    let expected = "\
v Contoso
  v Production
    - kv-orders (Microsoft.KeyVault/vaults)
    - orders (Microsoft.Sql/servers/databases)
v Fabrikam
  v Dev
    - vault-orders-dev (Microsoft.KeyVault/vaults)
";
    assert_eq!(TreeRenderer::new().render(results.root()), expected);
    assert_eq!(summary.matches, 3);
    assert_eq!(summary.accounts, 2);
    assert_eq!(summary.subscriptions, 2);
    assert_eq!(summary.error, None);
}

#[test]
fn test_get_or_create_subscription_returns_same_node() {
    let aggregator = SearchAggregator::new();
    let account = aggregator.get_or_create_account("contoso", "Contoso");

    let first = account.get_or_create_subscription("sub-1", "Production");
    let second = account.get_or_create_subscription("sub-1", "Production");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(account.child_count(), 1);
}

#[tokio::test]
async fn test_search_hit_wraps_browse_node() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);
    let cancel = CancellationToken::new();
    explorer.expand_all(4, &cancel).await.unwrap();
    let server = find_path(
        explorer.root(),
        &["Contoso", "Production", "rg-web", "SQL Servers", "sql-main"],
    );

    let aggregator = SearchAggregator::new();
    let hit = aggregator.add_match(&SearchMatch {
        account_id: "contoso".to_string(),
        account_label: "Contoso".to_string(),
        subscription_id: "sub-prod".to_string(),
        subscription_label: "Production".to_string(),
        resource_name: "sql-main".to_string(),
        resource_type: "Microsoft.Sql/servers".to_string(),
        resource_id: server.resource_id().unwrap().to_string(),
        actual_node: Some(server.clone()),
    });

    assert!(hit.supports_children());
    assert_eq!(hit.context_menu_id(), server.context_menu_id());
    assert_eq!(hit.child_labels(), vec!["Loading..."]);
    assert_eq!(available_commands(&hit), available_commands(&server));

    let outcome = expand(&hit, explorer.context(), &cancel).await.unwrap();

    assert_eq!(outcome, LoadOutcome::Loaded { added: 2 });
    assert_eq!(hit.child_labels(), vec!["Billing", "orders"]);
    assert_eq!(server.child_labels(), vec!["Billing", "orders"]);
    // The browse node still owns its children.
    assert!(Arc::ptr_eq(
        &server.children()[0].parent().unwrap(),
        &server
    ));
}

#[tokio::test]
async fn test_search_hit_expanded_while_browse_node_loads_waits_for_it() {
    let gate = Arc::new(Notify::new());
    let provider = Arc::new(ScriptedProvider::new().script(
        VAULT_TYPE,
        Script::Gated(names(&["kv-2", "kv-1"]), gate.clone()),
    ));
    let ctx = context(provider.clone(), config(&[]));
    let vaults = TreeNode::category("Key Vaults", Scope::account("acct"), VAULT_TYPE);
    let hit = TreeNode::wrapping("Key Vaults", "/kv", VAULT_TYPE, Some(&vaults));
    let cancel = CancellationToken::new();

    let browse_load = tokio::spawn({
        let (vaults, ctx, cancel) = (vaults.clone(), ctx.clone(), cancel.clone());
        async move { expand(&vaults, &ctx, &cancel).await }
    });
    for _ in 0..1000 {
        if provider.calls(VAULT_TYPE) == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(vaults.is_loading());

    let hit_load = tokio::spawn({
        let (hit, ctx, cancel) = (hit.clone(), ctx.clone(), cancel.clone());
        async move { expand(&hit, &ctx, &cancel).await }
    });
    for _ in 0..1000 {
        if hit.is_loading() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(hit.is_loading());
    assert_eq!(hit.child_labels(), vec!["Loading..."]);

    gate.notify_one();

    assert_eq!(browse_load.await.unwrap(), Ok(LoadOutcome::Loaded { added: 2 }));
    assert_eq!(hit_load.await.unwrap(), Ok(LoadOutcome::Loaded { added: 2 }));
    assert_eq!(vaults.child_labels(), vec!["kv-1", "kv-2"]);
    assert_eq!(hit.child_labels(), vec!["kv-1", "kv-2"]);
    assert!(hit.is_loaded());
    // Only the browse node's load queried the provider.
    assert_eq!(provider.calls(VAULT_TYPE), 1);
}

#[test]
fn test_search_hit_without_browse_node_is_a_leaf() {
    let hit = TreeNode::wrapping("kv-orders", "/kv", VAULT_TYPE, None);
    assert!(!hit.supports_children());
    assert_eq!(hit.child_count(), 0);
    assert_eq!(hit.context_menu_id(), 0);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_created_database_then_refresh_from_child() {
    let (_dir, path) = inventory_file();
    let explorer = explorer(&path);
    let cancel = CancellationToken::new();
    explorer.expand_all(4, &cancel).await.unwrap();
    let server = find_path(
        explorer.root(),
        &["Contoso", "Production", "rg-web", "SQL Servers", "sql-main"],
    );
    expand(&server, explorer.context(), &cancel).await.unwrap();

    let created = apply_created(
        &server,
        &ResourceDescriptor::new(
            format!("{}/databases/Audit", server.resource_id().unwrap()),
            "Audit",
            "Microsoft.Sql/servers/databases",
        ),
        &DefaultNodeFactory,
    )
    .unwrap();
    assert_eq!(server.child_labels(), vec!["Audit", "Billing", "orders"]);

    // Refreshing the server re-lists it from the inventory, which has no "Audit".
    let outcome = refresh_ancestor(
        &created,
        |node| node.resource_kind() == Some(ResourceKind::SqlServer),
        explorer.context(),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(outcome, Some(LoadOutcome::Loaded { added: 2 }));
    assert_eq!(server.child_labels(), vec!["Billing", "orders"]);
}

#[test]
fn test_server_commands_and_portal_link() {
    let server_id = concat!(
        "/subscriptions/sub-prod/resourceGroups/rg-web",
        "/providers/Microsoft.Sql/servers/sql-main"
    );
    let server = TreeNode::resource(
        ResourceDescriptor::new(
            server_id,
            "sql-main",
            "Microsoft.Sql/servers",
        ),
        ResourceKind::SqlServer,
        Default::default(),
    );

    let labels: Vec<String> = available_commands(&server)
        .iter()
        .map(NodeCommand::label)
        .collect();
    assert_eq!(
        labels,
        vec![
            "Refresh",
            "Open in Portal",
            "Copy Resource Id",
            "Create SQL Database...",
            "Delete"
        ]
    );
    assert_eq!(
        portal_url(server.resource_id().unwrap()),
        format!("https://portal.azure.com/#@/resource{}", server_id)
    );
}
