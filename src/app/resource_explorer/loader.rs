//! Category loading: the algorithm shared by every "list resources of kind K in
//! scope S" node, plus the expand/refresh entry points that dispatch on node kind.
//!
//! A load runs as follows:
//!
//! 1. `begin_load` guard; a refused guard returns [`LoadOutcome::Skipped`].
//! 2. Open the provider listing; cancellation unwinds without `end_load`.
//! 3. Turn each descriptor into a node through the factory, dropping `None`.
//! 4. Sort the batch and append it, or insert sorted item by item when streaming.
//! 5. On provider failure, swap in an error placeholder if nothing was added yet;
//!    otherwise keep what arrived and just log.
//! 6. `end_load` on every non-cancelled exit.

use super::children::compare_labels;
use super::errors::{categorize_error, LoadCancelled, LoadOutcome, ProviderError};
use super::factory::{ResourceKind, SUBSCRIPTIONS_TYPE};
use super::node::{Node, NodeKind, TreeNode};
use super::preload::load_resource_group;
use super::provider::{ExplorerContext, Scope};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Collect everything, sort once, append in order
    Batched,
    /// Insert each child at its sorted position as soon as it arrives
    Streaming,
}

/// Holds a node in `Loading` and decides how the load ends.
///
/// Dropping the guard without [`LoadingGuard::finish`] (cancellation, a dropped
/// future, a panic) puts the node back to `NotLoaded` with a single placeholder so
/// the next expand starts clean.
pub(crate) struct LoadingGuard<'a> {
    node: &'a Node,
    finished: bool,
    touched_children: bool,
}

impl<'a> LoadingGuard<'a> {
    pub(crate) fn new(node: &'a Node) -> Self {
        Self {
            node,
            finished: false,
            touched_children: false,
        }
    }

    pub(crate) fn mark_children_touched(&mut self) {
        self.touched_children = true;
    }

    pub(crate) fn finish(mut self) {
        self.finished = true;
        self.node.end_load();
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if self.touched_children {
            self.node.replace_children(vec![TreeNode::placeholder()]);
        }
        self.node.abort_load();
        debug!("Load of '{}' abandoned, node left retryable", self.node.label());
    }
}

pub struct CategoryLoader<'a> {
    ctx: &'a ExplorerContext,
    scope: &'a Scope,
    resource_type: &'a str,
    mode: LoadMode,
}

impl<'a> CategoryLoader<'a> {
    pub fn new(ctx: &'a ExplorerContext, scope: &'a Scope, resource_type: &'a str) -> Self {
        let mode = if ctx.config.streaming_loads {
            LoadMode::Streaming
        } else {
            LoadMode::Batched
        };
        Self {
            ctx,
            scope,
            resource_type,
            mode,
        }
    }

    pub async fn load(
        &self,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<LoadOutcome, LoadCancelled> {
        if !node.begin_load() {
            debug!(
                "Skipping load of '{}': already {:?}",
                node.label(),
                node.load_state()
            );
            return Ok(LoadOutcome::Skipped);
        }

        info!(
            "Loading {} in {} for '{}'",
            self.resource_type,
            self.scope,
            node.label()
        );
        let mut guard = LoadingGuard::new(node);
        let mut added = 0;

        let outcome = match self.fetch(node, cancel, &mut added, &mut guard).await {
            Ok(()) => {
                debug!("Loaded {} children into '{}'", added, node.label());
                LoadOutcome::Loaded { added }
            }
            Err(ProviderError::Cancelled) => {
                info!("Load of '{}' cancelled", node.label());
                drop(guard);
                return Err(LoadCancelled);
            }
            Err(ProviderError::Failed(error)) => {
                let message = format!("{:#}", error);
                let category = categorize_error(&error);
                if added == 0 {
                    warn!(
                        "Loading {} for '{}' failed ({}): {:#}",
                        self.resource_type,
                        node.label(),
                        category.short_label(),
                        error
                    );
                    node.replace_children(vec![TreeNode::error_placeholder(&message)]);
                    LoadOutcome::Failed { message }
                } else {
                    warn!(
                        "Loading {} for '{}' failed after {} items ({}), keeping them: {:#}",
                        self.resource_type,
                        node.label(),
                        added,
                        category.short_label(),
                        error
                    );
                    LoadOutcome::LoadedWithErrors { added, message }
                }
            }
        };

        guard.finish();
        Ok(outcome)
    }

    async fn fetch(
        &self,
        node: &Node,
        cancel: &CancellationToken,
        added: &mut usize,
        guard: &mut LoadingGuard<'_>,
    ) -> Result<(), ProviderError> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            opened = self
                .ctx
                .resources
                .list_resources(self.scope, self.resource_type, cancel.clone()) => opened?,
        };

        let mut batch = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = next else { break };
            let descriptor = item?;

            let Some(child) = self.ctx.factory.create_node(&descriptor, self.scope) else {
                trace!("Skipping unsupported resource type {}", descriptor.kind);
                continue;
            };

            match self.mode {
                LoadMode::Batched => batch.push(child),
                LoadMode::Streaming => {
                    guard.mark_children_touched();
                    node.insert_child_sorted(child, compare_labels);
                    *added += 1;
                }
            }
        }

        if !batch.is_empty() {
            batch.sort_by(|a, b| compare_labels(a.label(), b.label()));
            *added = batch.len();
            node.append_children(batch);
        }
        Ok(())
    }
}

/// Load a node's children according to its kind. Safe to call repeatedly; only
/// the first call while `NotLoaded` does any work.
pub fn expand<'a>(
    node: &'a Node,
    ctx: &'a ExplorerContext,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<LoadOutcome, LoadCancelled>> {
    async move {
        match node.kind() {
            NodeKind::Account { scope } => {
                CategoryLoader::new(ctx, scope, SUBSCRIPTIONS_TYPE)
                    .load(node, cancel)
                    .await
            }
            NodeKind::Category {
                scope,
                resource_type,
            } => {
                CategoryLoader::new(ctx, scope, resource_type)
                    .load(node, cancel)
                    .await
            }
            NodeKind::Resource {
                kind: ResourceKind::ResourceGroup,
                scope,
                ..
            } => load_resource_group(node, scope, ctx, cancel).await,
            NodeKind::Resource { kind, scope, .. } => match kind.child_resource_type() {
                Some(child_type) => {
                    CategoryLoader::new(ctx, scope, child_type)
                        .load(node, cancel)
                        .await
                }
                None => Ok(LoadOutcome::Skipped),
            },
            NodeKind::SearchResult { .. } => expand_wrapper(node, ctx, cancel).await,
            NodeKind::Placeholder
            | NodeKind::ErrorPlaceholder { .. }
            | NodeKind::Root
            | NodeKind::SearchGroup { .. } => Ok(LoadOutcome::Skipped),
        }
    }
    .boxed()
}

/// A search hit expands by loading the browse-tree node it wraps and showing
/// that node's children.
///
/// If the browse node is mid-load, the hit waits for that load to settle rather
/// than copying its placeholder.
async fn expand_wrapper(
    wrapper: &Node,
    ctx: &ExplorerContext,
    cancel: &CancellationToken,
) -> Result<LoadOutcome, LoadCancelled> {
    let Some(actual) = wrapper.actual_node() else {
        return Ok(LoadOutcome::Skipped);
    };
    if !wrapper.supports_children() || !wrapper.begin_load() {
        return Ok(LoadOutcome::Skipped);
    }
    let guard = LoadingGuard::new(wrapper);

    let outcome = loop {
        wait_while_loading(&actual, cancel).await?;
        match expand(&actual, ctx, cancel).await? {
            // Another caller started a load between the wait and our expand.
            LoadOutcome::Skipped if actual.is_loading() => continue,
            LoadOutcome::Skipped => {
                break LoadOutcome::Loaded {
                    added: actual.child_count(),
                }
            }
            outcome => break outcome,
        }
    };
    wrapper.mirror_children(actual.children());
    guard.finish();
    Ok(outcome)
}

async fn wait_while_loading(
    node: &Node,
    cancel: &CancellationToken,
) -> Result<(), LoadCancelled> {
    // Subscribe before checking so a transition in between is not missed.
    let mut signals = node.subscribe();
    while node.is_loading() {
        debug!("Waiting for '{}' to finish loading", node.label());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoadCancelled),
            signal = signals.recv() => {
                if signal.is_none() {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Mark a node stale and load it again from scratch.
///
/// Ignored while a load is already running. Stale children are swapped for a
/// single placeholder before the reload starts.
pub async fn refresh(
    node: &Node,
    ctx: &ExplorerContext,
    cancel: &CancellationToken,
) -> Result<LoadOutcome, LoadCancelled> {
    if node.is_loading() || !node.supports_children() {
        return Ok(LoadOutcome::Skipped);
    }
    if node.is_loaded() && !node.reset_loaded() {
        return Ok(LoadOutcome::Skipped);
    }
    info!("Refreshing '{}'", node.label());
    node.replace_children(vec![TreeNode::placeholder()]);
    expand(node, ctx, cancel).await
}
