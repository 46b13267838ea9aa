//! Node commands and the tree updates that follow remote mutations.
//!
//! Which commands a node offers is decided by switching on its [`ResourceKind`]
//! tag. The mutations themselves happen elsewhere; these helpers only bring the
//! already-built tree in line with what the remote side now looks like.

use super::children::compare_labels;
use super::errors::{LoadCancelled, LoadOutcome};
use super::factory::{NodeFactory, ResourceKind};
use super::loader::refresh;
use super::node::{Node, NodeKind, TreeNode};
use super::provider::{ExplorerContext, ResourceDescriptor};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::cmp::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const PORTAL_BASE: &str = "https://portal.azure.com/#@/resource";

/// Characters escaped inside one resource id path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    Refresh,
    CopyResourceId,
    OpenInPortal,
    /// Create a child of the given kind under this node
    Create(ResourceKind),
    Delete,
}

impl NodeCommand {
    pub fn label(&self) -> String {
        match self {
            NodeCommand::Refresh => "Refresh".to_string(),
            NodeCommand::CopyResourceId => "Copy Resource Id".to_string(),
            NodeCommand::OpenInPortal => "Open in Portal".to_string(),
            NodeCommand::Create(kind) => format!("Create {}...", kind.display_name()),
            NodeCommand::Delete => "Delete".to_string(),
        }
    }
}

fn commands_for_kind(kind: ResourceKind) -> Vec<NodeCommand> {
    use NodeCommand::*;
    match kind {
        ResourceKind::Subscription => vec![
            Refresh,
            OpenInPortal,
            CopyResourceId,
            Create(ResourceKind::ResourceGroup),
        ],
        ResourceKind::ResourceGroup => vec![Refresh, OpenInPortal, CopyResourceId, Delete],
        ResourceKind::StorageAccount => vec![
            Refresh,
            OpenInPortal,
            CopyResourceId,
            Create(ResourceKind::BlobContainer),
            Delete,
        ],
        ResourceKind::SqlServer => vec![
            Refresh,
            OpenInPortal,
            CopyResourceId,
            Create(ResourceKind::SqlDatabase),
            Delete,
        ],
        ResourceKind::WebApp => vec![
            Refresh,
            OpenInPortal,
            CopyResourceId,
            Create(ResourceKind::DeploymentSlot),
            Delete,
        ],
        ResourceKind::VirtualNetwork => vec![
            Refresh,
            OpenInPortal,
            CopyResourceId,
            Create(ResourceKind::Subnet),
            Delete,
        ],
        ResourceKind::VirtualMachine
        | ResourceKind::KeyVault
        | ResourceKind::BlobContainer
        | ResourceKind::DeploymentSlot
        | ResourceKind::SqlDatabase
        | ResourceKind::Subnet => vec![OpenInPortal, CopyResourceId, Delete],
    }
}

/// Commands offered for `node`. Search hits offer what their wrapped node offers.
pub fn available_commands(node: &TreeNode) -> Vec<NodeCommand> {
    match node.kind() {
        NodeKind::Resource { kind, .. } => commands_for_kind(*kind),
        NodeKind::Account { .. } | NodeKind::Category { .. } => vec![NodeCommand::Refresh],
        NodeKind::SearchResult { .. } => match node.actual_node() {
            Some(actual) => available_commands(&actual),
            None => vec![NodeCommand::OpenInPortal, NodeCommand::CopyResourceId],
        },
        NodeKind::Placeholder
        | NodeKind::ErrorPlaceholder { .. }
        | NodeKind::Root
        | NodeKind::SearchGroup { .. } => Vec::new(),
    }
}

/// Portal deep link for a fully qualified resource id
pub fn portal_url(resource_id: &str) -> String {
    let path: Vec<String> = resource_id
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    let path = path.join("/");
    if path.starts_with('/') {
        format!("{}{}", PORTAL_BASE, path)
    } else {
        format!("{}/{}", PORTAL_BASE, path)
    }
}

/// Show a remotely created resource under `parent`.
///
/// Only an already loaded parent is touched. An unloaded parent will list the
/// new resource itself on its next expand, and a loading one will pick it up
/// from the in-flight query. Returns the inserted node.
pub fn apply_created(
    parent: &Node,
    descriptor: &ResourceDescriptor,
    factory: &dyn NodeFactory,
) -> Option<Node> {
    if !parent.is_loaded() {
        debug!(
            "'{}' not loaded yet, skipping insert of '{}'",
            parent.label(),
            descriptor.name
        );
        return None;
    }
    let scope = match parent.kind() {
        NodeKind::Resource { scope, .. }
        | NodeKind::Category { scope, .. }
        | NodeKind::Account { scope } => scope.clone(),
        _ => return None,
    };
    let child = factory.create_node(descriptor, &scope)?;
    // An error placeholder from a failed load is stale once something exists.
    parent.remove_child_where(|node| node.is_error_placeholder());
    let index = parent.insert_child_sorted(child.clone(), compare_labels);
    info!(
        "Inserted '{}' under '{}' at {}",
        child.label(),
        parent.label(),
        index
    );
    Some(child)
}

/// Drop the child labelled `label` (case-insensitive) after a remote delete.
pub fn apply_deleted(parent: &Node, label: &str) -> Option<Node> {
    let removed = parent.remove_child_where(|node| {
        !node.is_loading_placeholder() && compare_labels(node.label(), label) == Ordering::Equal
    });
    match &removed {
        Some(node) => info!("Removed '{}' from '{}'", node.label(), parent.label()),
        None => debug!("No child '{}' under '{}' to remove", label, parent.label()),
    }
    removed
}

/// Refresh the nearest ancestor of `node` accepted by `predicate`.
///
/// Used after mutations whose effect shows up higher in the tree, e.g. a new
/// database should re-list its server. `Ok(None)` when no ancestor matches.
pub async fn refresh_ancestor<P>(
    node: &Node,
    predicate: P,
    ctx: &ExplorerContext,
    cancel: &CancellationToken,
) -> Result<Option<LoadOutcome>, LoadCancelled>
where
    P: Fn(&TreeNode) -> bool,
{
    let Some(ancestor) = node.find_ancestor(predicate) else {
        debug!("No matching ancestor above '{}'", node.label());
        return Ok(None);
    };
    refresh(&ancestor, ctx, cancel).await.map(Some)
}
