//! Lazily loaded cloud inventory tree.
//!
//! Nodes start with a single "Loading..." placeholder and fill in their children
//! on first expand, through a [`ResourceProvider`] carried by an
//! [`ExplorerContext`]. Resource groups pre-load their category children
//! concurrently, and search results are aggregated into a separate three-level
//! tree whose leaves can wrap nodes of the browse tree.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod children;
pub mod commands;
pub mod errors;
pub mod factory;
pub mod inventory;
pub mod loader;
pub mod node;
pub mod preload;
pub mod provider;
pub mod search;
pub mod tree;

pub use children::{compare_labels, ChildChange, ChildSequence};
pub use commands::{
    apply_created, apply_deleted, available_commands, portal_url, refresh_ancestor, NodeCommand,
};
pub use errors::{categorize_error, ErrorCategory, LoadCancelled, LoadOutcome, ProviderError};
pub use factory::{DefaultNodeFactory, NodeFactory, ResourceKind};
pub use inventory::{InventorySnapshot, SnapshotProvider};
pub use loader::{expand, refresh, CategoryLoader, LoadMode};
pub use node::{LoadState, Node, NodeKind, NodeSignal, TreeNode};
pub use preload::{PreloadOrchestrator, PreloadReport};
pub use provider::{
    ExplorerContext, ResourceDescriptor, ResourceProvider, Scope, SearchMatch, SearchProvider,
};
pub use search::{SearchAggregator, SearchSummary};
pub use tree::{expand_to_depth, ExpandStats, TreeRenderer};

/// Browse tree over a set of accounts
pub struct ResourceExplorer {
    ctx: ExplorerContext,
    root: Node,
}

impl ResourceExplorer {
    /// `accounts` are `(id, label)` pairs; each becomes a lazy account node.
    pub fn new(ctx: ExplorerContext, accounts: &[(String, String)]) -> Self {
        let root = TreeNode::root("Accounts");
        root.append_children(
            accounts
                .iter()
                .map(|(id, label)| TreeNode::account(id, label)),
        );
        Self { ctx, root }
    }

    pub fn context(&self) -> &ExplorerContext {
        &self.ctx
    }

    /// Invisible root whose children are the account nodes
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn accounts(&self) -> Vec<Node> {
        self.root.children()
    }

    pub async fn expand_all(
        &self,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<ExpandStats, LoadCancelled> {
        let mut stats = ExpandStats::default();
        for account in self.accounts() {
            let account_stats = expand_to_depth(&account, depth, &self.ctx, cancel).await?;
            stats.expanded += account_stats.expanded;
            stats.failed += account_stats.failed;
            stats.partial += account_stats.partial;
        }
        Ok(stats)
    }

    /// Run a search through the context's search provider into a fresh result tree.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<(SearchAggregator, SearchSummary), LoadCancelled> {
        let aggregator = SearchAggregator::new();
        let provider = Arc::clone(&self.ctx.search);
        let summary = aggregator.run(provider.as_ref(), query, cancel).await?;
        Ok((aggregator, summary))
    }
}
