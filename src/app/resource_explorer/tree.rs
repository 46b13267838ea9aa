//! Plain-text rendering of a node tree, and depth-limited expansion for it.

use super::errors::{LoadCancelled, LoadOutcome};
use super::loader::expand;
use super::node::Node;
use super::provider::ExplorerContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counts gathered while expanding a subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandStats {
    pub expanded: usize,
    pub failed: usize,
    pub partial: usize,
}

/// Expand `node` and its descendants down to `depth` levels below it.
///
/// Failed branches are counted and left as they are; cancellation stops the
/// whole walk.
pub fn expand_to_depth<'a>(
    node: &'a Node,
    depth: usize,
    ctx: &'a ExplorerContext,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<ExpandStats, LoadCancelled>> {
    async move {
        let mut stats = ExpandStats::default();
        if depth == 0 || !node.supports_children() {
            return Ok(stats);
        }

        match expand(node, ctx, cancel).await? {
            LoadOutcome::Failed { .. } => stats.failed += 1,
            LoadOutcome::LoadedWithErrors { .. } => stats.partial += 1,
            LoadOutcome::Loaded { .. } | LoadOutcome::Skipped => {}
        }
        node.set_expanded(true);
        stats.expanded += 1;

        for child in node.children() {
            let child_stats = expand_to_depth(&child, depth - 1, ctx, cancel).await?;
            stats.expanded += child_stats.expanded;
            stats.failed += child_stats.failed;
            stats.partial += child_stats.partial;
        }
        debug!(
            "Expanded '{}' to depth {}: {:?}",
            node.label(),
            depth,
            stats
        );
        Ok(stats)
    }
    .boxed()
}

const INDENT: usize = 2;

/// Indented text renderer. Collapsed nodes are printed without their children.
pub struct TreeRenderer {
    show_age: bool,
    filter: Option<String>,
}

impl Default for TreeRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeRenderer {
    pub fn new() -> Self {
        Self {
            show_age: false,
            filter: None,
        }
    }

    /// Append the age of the last load to loaded nodes
    pub fn with_age(mut self, show_age: bool) -> Self {
        self.show_age = show_age;
        self
    }

    /// Only print branches containing a label that fuzzy-matches `filter`
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = if filter.trim().is_empty() {
            None
        } else {
            Some(filter.to_string())
        };
        self
    }

    /// Render the children of `root`; the root itself is not printed.
    pub fn render(&self, root: &Node) -> String {
        let matcher = SkimMatcherV2::default();
        let mut out = String::new();
        for child in root.children() {
            self.render_node(&mut out, &child, 0, &matcher);
        }
        out
    }

    fn render_node(&self, out: &mut String, node: &Node, depth: usize, matcher: &SkimMatcherV2) {
        if !self.is_visible(node, matcher) {
            return;
        }

        let marker = if !node.supports_children() {
            "-"
        } else if node.is_expanded() {
            "v"
        } else {
            ">"
        };
        let _ = write!(
            out,
            "{:width$}{} {}",
            "",
            marker,
            node.label(),
            width = depth * INDENT
        );
        let description = node.description();
        if !description.is_empty() {
            let _ = write!(out, " ({})", description);
        }
        if self.show_age && node.supports_children() {
            if let Some(age) = node.age_display() {
                let _ = write!(out, " [{}]", age);
            }
        }
        out.push('\n');

        if node.is_expanded() {
            for child in node.children() {
                self.render_node(out, &child, depth + 1, matcher);
            }
        }
    }

    fn is_visible(&self, node: &Node, matcher: &SkimMatcherV2) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        if matcher.fuzzy_match(node.label(), filter).is_some() {
            return true;
        }
        node.is_expanded()
            && node
                .children()
                .iter()
                .any(|child| self.is_visible(child, matcher))
    }
}
