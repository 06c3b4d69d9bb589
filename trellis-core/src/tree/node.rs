//! Tree Nodes
//!
//! This module defines the persistent nodes the reconciler builds from
//! descriptions. A node survives across renders for as long as the
//! reconciler keeps matching it.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::error::RenderError;
use crate::host::HostHandle;
use crate::reactive::Subscription;
use crate::render::{Hooks, PendingEffect, RenderFn};
use crate::view::{Binding, Boundary, Component, ContextValue, Key, Props, View};

/// Unique identifier for a node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Work recorded on a node during a pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Insert or move the node's host output.
        const PLACEMENT = 1 << 0;
        /// Host attributes (or text) need to be re-applied.
        const UPDATE = 1 << 1;
        /// Scheduled for teardown.
        const DELETION = 1 << 2;
        /// Requested an update that has not been committed yet.
        const DIRTY = 1 << 3;
        /// Skipped rendering in the last pass; children were reused.
        const MEMOIZED = 1 << 4;
        /// Host node with no reactive bindings.
        const STATIC_HOST = 1 << 5;
    }
}

/// Content of a text node.
#[derive(Debug, Clone)]
pub enum TextSource {
    Static(Cow<'static, str>),
    Bound(Binding),
}

impl TextSource {
    pub fn content(&self) -> String {
        match self {
            TextSource::Static(s) => s.to_string(),
            TextSource::Bound(binding) => binding.current().to_text(),
        }
    }
}

/// The kind of node.
#[derive(Clone)]
pub enum NodeKind {
    /// A host element, e.g. `div`.
    Host(Cow<'static, str>),
    /// A text leaf.
    Text(TextSource),
    /// A component invocation.
    Component(Component),
    /// A grouping node with no host output. Roots are fragments.
    Fragment,
    /// A context provider.
    Provider(ContextValue),
    /// An error/suspense boundary.
    Boundary(Boundary),
}

impl NodeKind {
    /// Short name for diagnostics.
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Host(tag) => tag,
            NodeKind::Text(_) => "#text",
            NodeKind::Component(c) => c.name(),
            NodeKind::Fragment => "#fragment",
            NodeKind::Provider(_) => "#provider",
            NodeKind::Boundary(_) => "#boundary",
        }
    }

    /// Whether the node owns a host node.
    pub fn is_host(&self) -> bool {
        matches!(self, NodeKind::Host(_) | NodeKind::Text(_))
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Text(source) => write!(f, "Text({source:?})"),
            other => f.write_str(other.name()),
        }
    }
}

/// What a node looked like at its last commit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub props: Props,
    pub key: Option<Key>,
    pub index: usize,
}

/// Why a boundary is showing its fallback.
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    Error(RenderError),
    Pending,
}

/// A node in the tree.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) key: Option<Key>,
    /// Position in the parent's last child description, holes included.
    pub(crate) index: usize,
    pub(crate) depth: usize,

    pub(crate) parent: Option<NodeId>,
    pub(crate) child: Option<NodeId>,
    pub(crate) sibling: Option<NodeId>,

    pub(crate) props: Props,
    pub(crate) children: View,
    /// A new description arrived and has not been walked yet.
    pub(crate) fresh: bool,
    pub(crate) prev: Option<Snapshot>,
    pub(crate) flags: NodeFlags,
    pub(crate) deletions: Vec<NodeId>,

    pub(crate) hooks: Hooks,
    pub(crate) render: Option<RenderFn>,
    pub(crate) effects: Vec<PendingEffect>,
    /// Signal subscriptions made by the last render.
    pub(crate) subs: SmallVec<[Subscription; 4]>,
    /// Per-attribute binding subscriptions, keyed by attribute name.
    pub(crate) cleanups: IndexMap<Cow<'static, str>, Subscription>,
    /// Nodes that read this provider's value.
    pub(crate) consumers: IndexSet<NodeId>,
    pub(crate) fault: Option<Fault>,

    pub(crate) host: Option<HostHandle>,
    pub(crate) host_props: Option<Props>,
}

impl Node {
    pub(crate) fn new(kind: NodeKind, key: Option<Key>, props: Props, children: View) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            key,
            index: 0,
            depth: 0,
            parent: None,
            child: None,
            sibling: None,
            props,
            children,
            fresh: true,
            prev: None,
            flags: NodeFlags::empty(),
            deletions: Vec::new(),
            hooks: Hooks::default(),
            render: None,
            effects: Vec::new(),
            subs: SmallVec::new(),
            cleanups: IndexMap::new(),
            consumers: IndexSet::new(),
            fault: None,
            host: None,
            host_props: None,
        }
    }

    /// A root node rendering into `container`.
    pub(crate) fn root(container: HostHandle, children: View) -> Self {
        let mut node = Self::new(NodeKind::Fragment, None, Props::new(), children);
        node.host = Some(container);
        node
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.child
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.sibling
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    /// The committed snapshot, `None` before the first commit.
    pub fn prev(&self) -> Option<&Snapshot> {
        self.prev.as_ref()
    }

    pub fn is_committed(&self) -> bool {
        self.prev.is_some()
    }

    pub fn host(&self) -> Option<HostHandle> {
        self.host
    }

    /// The error a boundary is currently showing its fallback for.
    pub fn caught_error(&self) -> Option<&RenderError> {
        match &self.fault {
            Some(Fault::Error(err)) => Some(err),
            _ => None,
        }
    }

    /// Whether a boundary is waiting on a suspension.
    pub fn is_suspended(&self) -> bool {
        matches!(self.fault, Some(Fault::Pending))
    }

    /// Number of signal subscriptions held by the last render.
    pub fn subscription_count(&self) -> usize {
        self.subs.len() + self.cleanups.len()
    }

    /// Whether the node is the root of a mounted tree.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Whether host children of this node are placed into its host node.
    pub(crate) fn is_host_parent(&self) -> bool {
        matches!(self.kind, NodeKind::Host(_)) || self.parent.is_none()
    }

    /// Props handed to the host at commit, with bindings resolved.
    pub(crate) fn host_attributes(&self) -> Props {
        match &self.kind {
            NodeKind::Text(source) => Props::text(source.content()),
            _ => self.props.resolve(),
        }
    }

    /// Drop everything the node holds on to: subscriptions, binding
    /// cleanups, hook teardowns and owned effects.
    pub(crate) fn teardown(&mut self) {
        self.subs.clear();
        self.cleanups.clear();
        self.hooks.teardown();
        self.effects.clear();
        self.render = None;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("index", &self.index)
            .field("parent", &self.parent)
            .field("flags", &self.flags)
            .finish()
    }
}
