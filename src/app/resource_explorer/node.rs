//! Tree entities and the per-node loading state machine.
//!
//! A [`TreeNode`] is always handled through [`Node`] (`Arc<TreeNode>`). Ownership
//! flows strictly parent -> child through each node's [`ChildSequence`]; the only
//! upward link is a `Weak` parent pointer used to locate ancestors for refresh.
//!
//! # Loading state machine
//!
//! ```text
//! NotLoaded --begin_load--> Loading --end_load--> Loaded
//!                              |
//!                              +--abort_load--> NotLoaded   (cancellation)
//! Loaded --reset_loaded--> NotLoaded                        (refresh)
//! ```
//!
//! `begin_load` is a compare-and-swap so concurrent expand requests for the same
//! node, even from different runtime threads, start at most one provider query.

use super::children::{ChildChange, ChildSequence};
use super::factory::ResourceKind;
use super::provider::{ResourceDescriptor, Scope};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::mpsc;

pub type Node = Arc<TreeNode>;

pub const LOADING_LABEL: &str = "Loading...";
pub const ERROR_LABEL_PREFIX: &str = "Error: ";

/// Context menu ids for node kinds that are not resources. 0 means no menu.
pub const NO_MENU: u32 = 0;
pub const ACCOUNT_MENU: u32 = 1;
pub const CATEGORY_MENU: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
}

impl LoadState {
    fn as_u8(self) -> u8 {
        match self {
            LoadState::NotLoaded => 0,
            LoadState::Loading => 1,
            LoadState::Loaded => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadState::Loading,
            2 => LoadState::Loaded,
            _ => LoadState::NotLoaded,
        }
    }
}

/// Per-node "state changed" signal for label/description/icon refreshes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSignal {
    LoadState(LoadState),
    Description,
    Expanded(bool),
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// "Loading..." sentinel
    Placeholder,
    /// Inert child left behind by a failed load
    ErrorPlaceholder { message: String },
    /// Top-level account; lists subscriptions
    Account { scope: Scope },
    /// Lists resources of one type inside `scope`
    Category { scope: Scope, resource_type: String },
    /// A concrete resource. `scope` is the scope its own children live in.
    Resource {
        kind: ResourceKind,
        scope: Scope,
        descriptor: ResourceDescriptor,
    },
    /// Invisible root of a browse or search result tree
    Root,
    /// Account or subscription level of a search result tree
    SearchGroup { group_id: String },
    /// Search hit, optionally wrapping a node of the browse tree
    SearchResult {
        resource_id: String,
        resource_type: String,
        actual: Option<Weak<TreeNode>>,
    },
}

pub struct TreeNode {
    label: String,
    description: RwLock<String>,
    kind: NodeKind,
    context_menu_id: u32,
    supports_children: bool,
    state: AtomicU8,
    expanded: AtomicBool,
    loaded_at: RwLock<Option<DateTime<Utc>>>,
    children: Mutex<ChildSequence>,
    parent: RwLock<Weak<TreeNode>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<NodeSignal>>>,
}

impl TreeNode {
    fn build(
        label: impl Into<String>,
        kind: NodeKind,
        context_menu_id: u32,
        supports_children: bool,
    ) -> Self {
        Self {
            label: label.into(),
            description: RwLock::new(String::new()),
            kind,
            context_menu_id,
            supports_children,
            state: AtomicU8::new(LoadState::NotLoaded.as_u8()),
            expanded: AtomicBool::new(false),
            loaded_at: RwLock::new(None),
            children: Mutex::new(ChildSequence::new()),
            parent: RwLock::new(Weak::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Wrap a freshly built node and give it its single placeholder child when
    /// it can be expanded.
    fn lazy(node: Self) -> Node {
        let node = Arc::new(node);
        if node.supports_children() {
            node.append_child(Self::placeholder());
        }
        node
    }

    fn inert(node: Self) -> Node {
        node.state
            .store(LoadState::Loaded.as_u8(), AtomicOrdering::Release);
        Arc::new(node)
    }

    pub fn placeholder() -> Node {
        Self::inert(Self::build(LOADING_LABEL, NodeKind::Placeholder, NO_MENU, false))
    }

    pub fn error_placeholder(message: &str) -> Node {
        Self::inert(Self::build(
            format!("{}{}", ERROR_LABEL_PREFIX, message),
            NodeKind::ErrorPlaceholder {
                message: message.to_string(),
            },
            NO_MENU,
            false,
        ))
    }

    pub fn account(account_id: &str, label: &str) -> Node {
        Self::lazy(Self::build(
            label,
            NodeKind::Account {
                scope: Scope::account(account_id),
            },
            ACCOUNT_MENU,
            true,
        ))
    }

    pub fn category(label: &str, scope: Scope, resource_type: &str) -> Node {
        Self::lazy(Self::build(
            label,
            NodeKind::Category {
                scope,
                resource_type: resource_type.to_string(),
            },
            CATEGORY_MENU,
            true,
        ))
    }

    /// Build a resource node. `scope` is the scope its own children are listed in.
    pub fn resource(descriptor: ResourceDescriptor, kind: ResourceKind, scope: Scope) -> Node {
        let node = Self::build(
            descriptor.name.clone(),
            NodeKind::Resource {
                kind,
                scope,
                descriptor: descriptor.clone(),
            },
            kind.context_menu_id(),
            kind.has_children(),
        );
        if !descriptor.state.is_empty() {
            *node
                .description
                .write()
                .unwrap_or_else(PoisonError::into_inner) = descriptor.state.clone();
        }
        Self::lazy(node)
    }

    /// Invisible, always loaded container for top-level nodes.
    pub fn root(label: &str) -> Node {
        let node = Self::build(label, NodeKind::Root, NO_MENU, true);
        node.state
            .store(LoadState::Loaded.as_u8(), AtomicOrdering::Release);
        node.expanded.store(true, AtomicOrdering::Release);
        Arc::new(node)
    }

    /// Account/subscription level of a search tree. Born loaded and expanded so
    /// results render immediately instead of as collapsed lazy nodes.
    pub fn search_group(group_id: &str, label: &str) -> Node {
        let node = Self::build(
            label,
            NodeKind::SearchGroup {
                group_id: group_id.to_string(),
            },
            NO_MENU,
            true,
        );
        node.state
            .store(LoadState::Loaded.as_u8(), AtomicOrdering::Release);
        node.expanded.store(true, AtomicOrdering::Release);
        Arc::new(node)
    }

    /// Search hit leaf. When `actual` is given, capability queries delegate to it
    /// and the wrapper gets one placeholder iff the wrapped node supports children.
    pub fn wrapping(
        label: &str,
        resource_id: &str,
        resource_type: &str,
        actual: Option<&Node>,
    ) -> Node {
        let node = Self::build(
            label,
            NodeKind::SearchResult {
                resource_id: resource_id.to_string(),
                resource_type: resource_type.to_string(),
                actual: actual.map(Arc::downgrade),
            },
            NO_MENU,
            false,
        );
        *node
            .description
            .write()
            .unwrap_or_else(PoisonError::into_inner) = resource_type.to_string();
        Self::lazy(node)
    }

    // ---- attributes ----

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn description(&self) -> String {
        self.description
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self
            .description
            .write()
            .unwrap_or_else(PoisonError::into_inner) = description.into();
        self.signal(NodeSignal::Description);
    }

    pub fn resource_kind(&self) -> Option<ResourceKind> {
        match &self.kind {
            NodeKind::Resource { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&ResourceDescriptor> {
        match &self.kind {
            NodeKind::Resource { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    pub fn scope(&self) -> Option<&Scope> {
        match &self.kind {
            NodeKind::Account { scope }
            | NodeKind::Category { scope, .. }
            | NodeKind::Resource { scope, .. } => Some(scope),
            _ => None,
        }
    }

    /// Resource id for resources and search hits
    pub fn resource_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Resource { descriptor, .. } => Some(&descriptor.id),
            NodeKind::SearchResult { resource_id, .. } => Some(resource_id),
            _ => None,
        }
    }

    pub fn is_loading_placeholder(&self) -> bool {
        matches!(self.kind, NodeKind::Placeholder)
    }

    pub fn is_error_placeholder(&self) -> bool {
        matches!(self.kind, NodeKind::ErrorPlaceholder { .. })
    }

    /// The wrapped browse-tree node of a search hit, if it is still alive.
    pub fn actual_node(&self) -> Option<Node> {
        match &self.kind {
            NodeKind::SearchResult {
                actual: Some(actual),
                ..
            } => actual.upgrade(),
            _ => None,
        }
    }

    pub fn supports_children(&self) -> bool {
        match &self.kind {
            NodeKind::SearchResult { .. } => self
                .actual_node()
                .map(|actual| actual.supports_children())
                .unwrap_or(false),
            _ => self.supports_children,
        }
    }

    pub fn context_menu_id(&self) -> u32 {
        match &self.kind {
            NodeKind::SearchResult { .. } => self
                .actual_node()
                .map(|actual| actual.context_menu_id())
                .unwrap_or(NO_MENU),
            _ => self.context_menu_id,
        }
    }

    /// Icon key derived from kind and loading state; never stored.
    pub fn icon_key(&self) -> String {
        let base = match &self.kind {
            NodeKind::Placeholder => return "loading".to_string(),
            NodeKind::ErrorPlaceholder { .. } => return "error".to_string(),
            NodeKind::Account { .. } => "account",
            NodeKind::Category { .. } => "folder",
            NodeKind::Resource { kind, .. } => kind.icon_key(),
            NodeKind::Root | NodeKind::SearchGroup { .. } => "folder",
            NodeKind::SearchResult { resource_type, .. } => ResourceKind::from_resource_type(
                resource_type,
            )
            .map(ResourceKind::icon_key)
            .unwrap_or("resource"),
        };
        if self.is_loading() {
            format!("{}-loading", base)
        } else {
            base.to_string()
        }
    }

    // ---- loading state machine ----

    pub fn load_state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(AtomicOrdering::Acquire))
    }

    pub fn is_loading(&self) -> bool {
        self.load_state() == LoadState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    fn transition(&self, from: LoadState, to: LoadState) -> bool {
        let swapped = self
            .state
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_ok();
        if swapped {
            self.signal(NodeSignal::LoadState(to));
        }
        swapped
    }

    /// Returns `false` when a load is already running or finished; callers must
    /// abort in that case.
    pub fn begin_load(&self) -> bool {
        self.transition(LoadState::NotLoaded, LoadState::Loading)
    }

    /// Drop any remaining "Loading..." placeholder and mark the node loaded.
    pub fn end_load(&self) {
        self.lock_children().remove_loading_placeholders();
        *self
            .loaded_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.state
            .store(LoadState::Loaded.as_u8(), AtomicOrdering::Release);
        self.signal(NodeSignal::LoadState(LoadState::Loaded));
    }

    /// Back out of a load that was cancelled, leaving the node retryable.
    pub fn abort_load(&self) -> bool {
        self.transition(LoadState::Loading, LoadState::NotLoaded)
    }

    /// Mark a loaded node stale. No-op while a load is running.
    pub fn reset_loaded(&self) -> bool {
        self.transition(LoadState::Loaded, LoadState::NotLoaded)
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        *self.loaded_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Human-readable age of the last successful load
    pub fn age_display(&self) -> Option<String> {
        let loaded_at = self.loaded_at()?;
        let age = Utc::now().signed_duration_since(loaded_at);
        Some(if age.num_days() > 0 {
            format!("{}d ago", age.num_days())
        } else if age.num_hours() > 0 {
            format!("{}h ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{}m ago", age.num_minutes())
        } else {
            "just now".to_string()
        })
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded.load(AtomicOrdering::Acquire)
    }

    pub fn set_expanded(&self, expanded: bool) {
        if self.expanded.swap(expanded, AtomicOrdering::AcqRel) != expanded {
            self.signal(NodeSignal::Expanded(expanded));
        }
    }

    // ---- notifications ----

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NodeSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscribe_children(&self) -> mpsc::UnboundedReceiver<ChildChange> {
        self.lock_children().subscribe()
    }

    fn signal(&self, signal: NodeSignal) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(signal.clone()).is_ok());
    }

    // ---- children ----

    fn lock_children(&self) -> MutexGuard<'_, ChildSequence> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn adopt(self: &Arc<Self>, child: &Node) {
        *child.parent.write().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(self);
    }

    pub fn append_child(self: &Arc<Self>, child: Node) {
        self.adopt(&child);
        self.lock_children().append(child);
    }

    pub fn append_children<I>(self: &Arc<Self>, children: I)
    where
        I: IntoIterator<Item = Node>,
    {
        let mut sequence = self.lock_children();
        for child in children {
            self.adopt(&child);
            sequence.append(child);
        }
    }

    pub fn insert_child_sorted<F>(self: &Arc<Self>, child: Node, compare: F) -> usize
    where
        F: Fn(&str, &str) -> Ordering,
    {
        self.adopt(&child);
        self.lock_children().insert_sorted(child, compare)
    }

    pub fn replace_children(self: &Arc<Self>, children: Vec<Node>) {
        for child in &children {
            self.adopt(child);
        }
        self.lock_children().replace_all(children);
    }

    /// Show another node's children without taking over their parent links.
    pub(crate) fn mirror_children(&self, children: Vec<Node>) {
        self.lock_children().replace_all(children);
    }

    pub fn remove_child_where<P>(&self, predicate: P) -> Option<Node>
    where
        P: Fn(&TreeNode) -> bool,
    {
        let mut sequence = self.lock_children();
        let index = sequence.position(|node| predicate(node))?;
        sequence.remove(index)
    }

    pub fn find_child<P>(&self, predicate: P) -> Option<Node>
    where
        P: Fn(&TreeNode) -> bool,
    {
        self.lock_children()
            .iter()
            .find(|node| predicate(node))
            .cloned()
    }

    /// Lookup and append under one lock so two callers can never both create.
    pub(crate) fn find_or_append_child<P, F>(self: &Arc<Self>, predicate: P, make: F) -> Node
    where
        P: Fn(&TreeNode) -> bool,
        F: FnOnce() -> Node,
    {
        let mut sequence = self.lock_children();
        if let Some(existing) = sequence.iter().find(|node| predicate(node)) {
            return existing.clone();
        }
        let child = make();
        self.adopt(&child);
        sequence.append(child.clone());
        child
    }

    pub fn children(&self) -> Vec<Node> {
        self.lock_children().to_vec()
    }

    pub fn child_labels(&self) -> Vec<String> {
        self.lock_children()
            .iter()
            .map(|node| node.label().to_string())
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.lock_children().len()
    }

    pub fn placeholder_count(&self) -> usize {
        self.lock_children().placeholder_count()
    }

    pub fn parent(&self) -> Option<Node> {
        self.parent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
    }

    /// Walk parent links to the nearest ancestor accepted by `predicate`.
    pub fn find_ancestor<P>(&self, predicate: P) -> Option<Node>
    where
        P: Fn(&TreeNode) -> bool,
    {
        let mut current = self.parent();
        while let Some(node) = current {
            if predicate(&node) {
                return Some(node);
            }
            current = node.parent();
        }
        None
    }
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("state", &self.load_state())
            .field("children", &self.child_count())
            .finish()
    }
}
