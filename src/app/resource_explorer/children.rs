//! Ordered child container with structural change notifications.
//!
//! [`ChildSequence`] is a plain `Vec` of nodes plus a list of subscribers. Every
//! structural mutation (insert, remove, replace) is published to the subscribers
//! as a [`ChildChange`], which is all a UI adapter needs to keep a bound list
//! control in sync without the tree depending on any UI type.

use super::node::Node;
use std::cmp::Ordering;
use tokio::sync::mpsc;

/// Structural change published by a [`ChildSequence`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildChange {
    /// A node was inserted at `index`
    Inserted { index: usize },
    /// The node previously at `index` was removed
    Removed { index: usize },
    /// The whole sequence was swapped for `count` new nodes
    ReplacedAll { count: usize },
}

/// Ordinal, case-insensitive label comparison used for resource labels.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}

#[derive(Default)]
pub struct ChildSequence {
    items: Vec<Node>,
    listeners: Vec<mpsc::UnboundedSender<ChildChange>>,
}

impl ChildSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Dropped receivers are pruned on the next change.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChildChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    fn notify(&mut self, change: ChildChange) {
        self.listeners.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Node> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Node> {
        self.items.clone()
    }

    /// Add to the end. Used when the caller already holds a sorted batch.
    pub fn append(&mut self, node: Node) -> usize {
        let index = self.items.len();
        self.items.push(node);
        self.notify(ChildChange::Inserted { index });
        index
    }

    /// Insert before the first existing node whose label compares `>=` the new one.
    pub fn insert_sorted<F>(&mut self, node: Node, compare: F) -> usize
    where
        F: Fn(&str, &str) -> Ordering,
    {
        let index = self
            .items
            .iter()
            .position(|existing| compare(existing.label(), node.label()) != Ordering::Less)
            .unwrap_or(self.items.len());
        self.items.insert(index, node);
        self.notify(ChildChange::Inserted { index });
        index
    }

    /// Atomic swap of the whole sequence.
    pub fn replace_all(&mut self, nodes: Vec<Node>) {
        let count = nodes.len();
        self.items = nodes;
        self.notify(ChildChange::ReplacedAll { count });
    }

    pub fn remove(&mut self, index: usize) -> Option<Node> {
        if index >= self.items.len() {
            return None;
        }
        let node = self.items.remove(index);
        self.notify(ChildChange::Removed { index });
        Some(node)
    }

    pub fn position<P>(&self, predicate: P) -> Option<usize>
    where
        P: Fn(&Node) -> bool,
    {
        self.items.iter().position(predicate)
    }

    /// Remove every "Loading..." placeholder, leaving error placeholders alone.
    pub fn remove_loading_placeholders(&mut self) -> usize {
        let mut removed = 0;
        let mut index = self.items.len();
        while index > 0 {
            index -= 1;
            if self.items[index].is_loading_placeholder() {
                self.items.remove(index);
                self.notify(ChildChange::Removed { index });
                removed += 1;
            }
        }
        removed
    }

    pub fn placeholder_count(&self) -> usize {
        self.items
            .iter()
            .filter(|node| node.is_loading_placeholder())
            .count()
    }
}

impl std::fmt::Debug for ChildSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.items.iter().map(|node| node.label()))
            .finish()
    }
}
