//! Node Tree
//!
//! The persistent tree the reconciler builds and the scheduler walks.
//!
//! # Overview
//!
//! Nodes live in a map indexed by [`NodeId`] and link to each other through
//! `parent`, first `child` and next `sibling` ids. Children therefore form a
//! singly linked list in description order, which is exactly the order the
//! work loop visits them in and the order host siblings are searched in.
//!
//! # Design Decisions
//!
//! 1. A central map rather than owned child vectors, so any node can be
//!    addressed by id from an update request without walking from a root.
//!
//! 2. Lookups are O(1); iteration helpers ([`Tree::children`],
//!    [`Tree::ancestors`]) follow the links lazily.

mod node;

pub use node::{Node, NodeFlags, NodeId, NodeKind, Snapshot, TextSource};
pub(crate) use node::Fault;

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Storage for every live node.
#[derive(Default)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
}

impl Tree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the tree.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node. Links pointing at it are left for the caller.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.nodes.remove(&node_id)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Like [`get_node`](Self::get_node), failing with [`Error::UnknownNode`].
    pub fn node(&self, node_id: NodeId) -> Result<&Node> {
        self.nodes.get(&node_id).ok_or(Error::UnknownNode(node_id))
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(&node_id)
            .ok_or(Error::UnknownNode(node_id))
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get the total number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Children of `node_id` in order.
    pub fn children(&self, node_id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get_node(node_id).and_then(|n| n.child),
        }
    }

    /// Proper ancestors of `node_id`, nearest first.
    pub fn ancestors(&self, node_id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.get_node(node_id).and_then(|n| n.parent),
        }
    }

    /// Whether `node_id` is `ancestor` or lies below it.
    pub fn is_within(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        node_id == ancestor || self.ancestors(node_id).any(|n| n.id == ancestor)
    }

    /// `node_id` and all of its descendants, in pre-order.
    pub fn subtree(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            out.push(id);
            // Reversed so the first child is popped first.
            let start = stack.len();
            stack.extend(self.children(id).map(Node::id));
            stack[start..].reverse();
        }
        out
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }
}

/// Iterator over a node's children.
pub struct Children<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get_node(self.next?)?;
        self.next = node.sibling;
        Some(node)
    }
}

/// Iterator over a node's ancestors.
pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.tree.get_node(self.next?)?;
        self.next = node.parent;
        Some(node)
    }
}
