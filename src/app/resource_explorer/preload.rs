//! Concurrent best-effort pre-loading of a scope node's category children.
//!
//! A resource group knows its category children up front. It creates them, marks
//! itself loaded, and then asks the [`PreloadOrchestrator`] to fill them all in at
//! once. Each category runs as its own task in a [`JoinSet`]; provider failures are
//! already absorbed by the category's loader, so the orchestrator only collects
//! outcomes, logs them, and never reports an error to its caller.

use super::errors::{LoadCancelled, LoadOutcome};
use super::loader::expand;
use super::node::{Node, TreeNode};
use super::provider::{ExplorerContext, Scope};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-batch tally of category outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub panicked: usize,
}

impl PreloadReport {
    pub fn total(&self) -> usize {
        self.loaded + self.partial + self.failed + self.skipped + self.cancelled + self.panicked
    }

    fn record(&mut self, result: &Result<LoadOutcome, LoadCancelled>) {
        match result {
            Ok(LoadOutcome::Loaded { .. }) => self.loaded += 1,
            Ok(LoadOutcome::LoadedWithErrors { .. }) => self.partial += 1,
            Ok(LoadOutcome::Failed { .. }) => self.failed += 1,
            Ok(LoadOutcome::Skipped) => self.skipped += 1,
            Err(LoadCancelled) => self.cancelled += 1,
        }
    }
}

pub struct PreloadOrchestrator {
    ctx: ExplorerContext,
}

impl PreloadOrchestrator {
    pub fn new(ctx: ExplorerContext) -> Self {
        Self { ctx }
    }

    /// Load every node concurrently and wait for all of them.
    ///
    /// One branch failing or panicking never cancels its siblings. Cancelling
    /// `cancel` stops the whole batch; the affected nodes stay retryable.
    pub async fn run(&self, nodes: Vec<Node>, cancel: CancellationToken) -> PreloadReport {
        let permits = self.ctx.config.max_concurrent_preloads.max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut tasks = JoinSet::new();

        info!(
            "Preloading {} categories ({} at a time)",
            nodes.len(),
            permits
        );

        for node in nodes {
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return (node.label().to_string(), Err(LoadCancelled)),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return (node.label().to_string(), Err(LoadCancelled)),
                    },
                };
                let result = expand(&node, &ctx, &cancel).await;
                (node.label().to_string(), result)
            });
        }

        let mut report = PreloadReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((label, result)) => {
                    match &result {
                        Ok(outcome) if outcome.is_failure() => {
                            debug!("Preload of '{}' finished with {:?}", label, outcome)
                        }
                        Err(LoadCancelled) => debug!("Preload of '{}' cancelled", label),
                        Ok(_) => {}
                    }
                    report.record(&result);
                }
                Err(join_error) => {
                    log_warn!("Preload task did not complete: {}", join_error);
                    report.panicked += 1;
                }
            }
        }

        info!(
            "Preload finished: {} loaded, {} partial, {} failed, {} skipped, {} cancelled, \
             {} panicked",
            report.loaded,
            report.partial,
            report.failed,
            report.skipped,
            report.cancelled,
            report.panicked
        );
        report
    }
}

/// Resource-group load: create the configured category children synchronously,
/// finish the group's own load, then preload the categories.
///
/// The group is already `Loaded` before the fan-out starts, so cancellation of the
/// fan-out is swallowed here and never reaches the caller.
pub async fn load_resource_group(
    node: &Node,
    scope: &Scope,
    ctx: &ExplorerContext,
    cancel: &CancellationToken,
) -> Result<LoadOutcome, LoadCancelled> {
    if !node.begin_load() {
        return Ok(LoadOutcome::Skipped);
    }

    let categories: Vec<Node> = ctx
        .config
        .categories
        .iter()
        .map(|category| TreeNode::category(&category.label, scope.clone(), &category.resource_type))
        .collect();
    let added = categories.len();
    node.append_children(categories.clone());
    node.end_load();
    debug!("Resource group '{}' created {} categories", node.label(), added);

    if ctx.config.preload_categories && !categories.is_empty() {
        let report = PreloadOrchestrator::new(ctx.clone())
            .run(categories, cancel.child_token())
            .await;
        if report.cancelled > 0 {
            debug!(
                "Preload under '{}' cancelled for {} categories",
                node.label(),
                report.cancelled
            );
        }
    }

    Ok(LoadOutcome::Loaded { added })
}
