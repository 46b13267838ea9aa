//! Incremental builder for the ephemeral account -> subscription -> result tree.
//!
//! Matches arrive one at a time from a [`SearchProvider`] stream. Account and
//! subscription nodes are deduplicated by id (the first label wins) and reused for
//! every later match, so expansion state and any UI bound to them survive while the
//! stream is still running. Results keep arrival order; they are never sorted.

use super::errors::{LoadCancelled, ProviderError};
use super::node::{Node, NodeKind, TreeNode};
use super::provider::{SearchMatch, SearchProvider, SearchStream};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts for one consumed search stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub matches: usize,
    pub accounts: usize,
    pub subscriptions: usize,
    /// Provider failure that ended the stream early, if any
    pub error: Option<String>,
}

fn is_group(node: &TreeNode, id: &str) -> bool {
    matches!(node.kind(), NodeKind::SearchGroup { group_id } if group_id == id)
}

impl TreeNode {
    /// Return the subscription child with `subscription_id`, creating it on first use.
    pub fn get_or_create_subscription(
        self: &Arc<Self>,
        subscription_id: &str,
        label: &str,
    ) -> Node {
        self.find_or_append_child(
            |node| is_group(node, subscription_id),
            || TreeNode::search_group(subscription_id, label),
        )
    }

    /// Append a wrapping leaf for `search_match`, preserving arrival order.
    pub fn add_result(self: &Arc<Self>, search_match: &SearchMatch) -> Node {
        let result = TreeNode::wrapping(
            &search_match.resource_name,
            &search_match.resource_id,
            &search_match.resource_type,
            search_match.actual_node.as_ref(),
        );
        self.append_child(result.clone());
        result
    }
}

pub struct SearchAggregator {
    root: Node,
}

impl Default for SearchAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchAggregator {
    pub fn new() -> Self {
        Self {
            root: TreeNode::root("Search results"),
        }
    }

    /// Invisible root whose children are the account nodes
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn accounts(&self) -> Vec<Node> {
        self.root.children()
    }

    pub fn get_or_create_account(&self, account_id: &str, label: &str) -> Node {
        self.root.find_or_append_child(
            |node| is_group(node, account_id),
            || TreeNode::search_group(account_id, label),
        )
    }

    /// Place one match in the tree and return its result node.
    pub fn add_match(&self, search_match: &SearchMatch) -> Node {
        let account =
            self.get_or_create_account(&search_match.account_id, &search_match.account_label);
        let subscription = account.get_or_create_subscription(
            &search_match.subscription_id,
            &search_match.subscription_label,
        );
        subscription.add_result(search_match)
    }

    /// Drain `stream` into the tree until it ends, fails, or `cancel` fires.
    ///
    /// A provider failure stops consumption but keeps everything already added;
    /// if nothing arrived yet, an error placeholder is shown under the root.
    pub async fn consume(
        &self,
        mut stream: SearchStream,
        cancel: &CancellationToken,
    ) -> Result<SearchSummary, LoadCancelled> {
        let mut summary = SearchSummary::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LoadCancelled),
                item = stream.next() => item,
            };
            match next {
                None => break,
                Some(Ok(search_match)) => {
                    self.add_match(&search_match);
                    summary.matches += 1;
                }
                Some(Err(ProviderError::Cancelled)) => return Err(LoadCancelled),
                Some(Err(ProviderError::Failed(error))) => {
                    let message = format!("{:#}", error);
                    warn!("Search stream failed after {} matches: {}", summary.matches, message);
                    if summary.matches == 0 {
                        self.root.append_child(TreeNode::error_placeholder(&message));
                    }
                    summary.error = Some(message);
                    break;
                }
            }
        }

        let accounts = self.accounts();
        summary.accounts = accounts
            .iter()
            .filter(|node| matches!(node.kind(), NodeKind::SearchGroup { .. }))
            .count();
        summary.subscriptions = accounts.iter().map(|account| account.child_count()).sum();
        debug!(
            "Search aggregated {} matches into {} accounts / {} subscriptions",
            summary.matches, summary.accounts, summary.subscriptions
        );
        Ok(summary)
    }

    /// Open a search on `provider` and consume it.
    pub async fn run(
        &self,
        provider: &dyn SearchProvider,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchSummary, LoadCancelled> {
        info!("Searching for '{}'", query);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoadCancelled),
            opened = provider.search(query, cancel.clone()) => opened,
        };
        match opened {
            Ok(stream) => self.consume(stream, cancel).await,
            Err(ProviderError::Cancelled) => Err(LoadCancelled),
            Err(ProviderError::Failed(error)) => {
                let message = format!("{:#}", error);
                warn!("Search for '{}' could not start: {}", query, message);
                self.root.append_child(TreeNode::error_placeholder(&message));
                Ok(SearchSummary {
                    error: Some(message),
                    ..Default::default()
                })
            }
        }
    }
}
