//! In-memory host.
//!
//! A small DOM: element and text nodes with ordered children. Every call the
//! scheduler makes is appended to an operation log so tests can assert on
//! exactly which host mutations a pass performed.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;

use super::{HostCommit, HostHandle, HostNode};
use crate::view::{Props, Value, TEXT_PROP};

/// One recorded host operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    Create {
        handle: HostHandle,
        kind: String,
    },
    Update {
        handle: HostHandle,
        first: bool,
    },
    Place {
        handle: HostHandle,
        parent: HostHandle,
        before: Option<HostHandle>,
    },
    Remove {
        handle: HostHandle,
    },
}

impl HostOp {
    pub fn handle(&self) -> HostHandle {
        match self {
            HostOp::Create { handle, .. }
            | HostOp::Update { handle, .. }
            | HostOp::Place { handle, .. }
            | HostOp::Remove { handle } => *handle,
        }
    }

    pub fn is_place(&self) -> bool {
        matches!(self, HostOp::Place { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, HostOp::Remove { .. })
    }
}

#[derive(Debug)]
enum Kind {
    Container,
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct MemNode {
    kind: Kind,
    attrs: IndexMap<String, serde_json::Value>,
    parent: Option<HostHandle>,
    children: Vec<HostHandle>,
}

impl MemNode {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            attrs: IndexMap::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A DOM-like host kept in memory.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: HashMap<HostHandle, MemNode>,
    next: u64,
    root: HostHandle,
    ops: Vec<HostOp>,
    flushes: usize,
    in_flush: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        let root = HostHandle(0);
        let mut nodes = HashMap::new();
        nodes.insert(root, MemNode::new(Kind::Container));
        Self {
            nodes,
            next: 1,
            root,
            ops: Vec::new(),
            flushes: 0,
            in_flush: false,
        }
    }

    /// The container created with the host, usable as a mount point.
    pub fn root(&self) -> HostHandle {
        self.root
    }

    /// A fresh detached container.
    pub fn create_container(&mut self) -> HostHandle {
        let handle = self.allocate();
        self.nodes.insert(handle, MemNode::new(Kind::Container));
        handle
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Completed commit batches.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Live nodes, containers included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, handle: HostHandle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn children(&self, handle: HostHandle) -> &[HostHandle] {
        self.nodes
            .get(&handle)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, handle: HostHandle) -> Option<HostHandle> {
        self.nodes.get(&handle).and_then(|n| n.parent)
    }

    pub fn attr(&self, handle: HostHandle, name: &str) -> Option<&serde_json::Value> {
        self.nodes.get(&handle).and_then(|n| n.attrs.get(name))
    }

    /// Concatenated text below `handle`.
    pub fn text_content(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.collect_text(handle, &mut out);
        out
    }

    fn collect_text(&self, handle: HostHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        if let Kind::Text(text) = &node.kind {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// Markup for the subtree at `handle`. Containers render only their
    /// children.
    pub fn markup(&self, handle: HostHandle) -> String {
        let mut out = String::new();
        self.write_markup(handle, &mut out);
        out
    }

    fn write_markup(&self, handle: HostHandle, out: &mut String) {
        let Some(node) = self.nodes.get(&handle) else {
            return;
        };
        match &node.kind {
            Kind::Text(text) => out.push_str(text),
            Kind::Container => {
                for child in &node.children {
                    self.write_markup(*child, out);
                }
            }
            Kind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.attrs {
                    match value {
                        serde_json::Value::String(s) => {
                            out.push_str(&format!(" {name}=\"{s}\""));
                        }
                        other => out.push_str(&format!(" {name}=\"{other}\"")),
                    }
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }

    /// JSON snapshot of the subtree at `handle`.
    pub fn to_json(&self, handle: HostHandle) -> serde_json::Value {
        let Some(node) = self.nodes.get(&handle) else {
            return serde_json::Value::Null;
        };
        let children: Vec<_> = node.children.iter().map(|c| self.to_json(*c)).collect();
        match &node.kind {
            Kind::Text(text) => json!(text),
            Kind::Container => json!({ "children": children }),
            Kind::Element(tag) => json!({
                "tag": tag,
                "attrs": node.attrs,
                "children": children,
            }),
        }
    }

    fn allocate(&mut self) -> HostHandle {
        let handle = HostHandle(self.next);
        self.next += 1;
        handle
    }

    fn detach(&mut self, handle: HostHandle) {
        let parent = self.nodes.get_mut(&handle).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != handle);
        }
    }

    fn drop_subtree(&mut self, handle: HostHandle) {
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            if let Some(node) = self.nodes.remove(&h) {
                stack.extend(node.children);
            }
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

fn attr_value(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Handler(_) => None,
        other => Some(other.to_json()),
    }
}

impl HostCommit for MemoryHost {
    fn create_host_node(&mut self, node: HostNode<'_>) -> HostHandle {
        let handle = self.allocate();
        let (kind, label) = match node {
            HostNode::Element { tag } => (Kind::Element(tag.to_string()), tag.to_string()),
            HostNode::Text => (Kind::Text(String::new()), "#text".to_string()),
        };
        self.nodes.insert(handle, MemNode::new(kind));
        self.ops.push(HostOp::Create {
            handle,
            kind: label,
        });
        handle
    }

    fn update_host_node(&mut self, handle: HostHandle, prev: Option<&Props>, next: &Props) {
        let Some(node) = self.nodes.get_mut(&handle) else {
            tracing::warn!(handle = handle.0, "update of unknown host node");
            return;
        };
        match &mut node.kind {
            Kind::Text(text) => {
                *text = next.get(TEXT_PROP).map(Value::to_text).unwrap_or_default();
            }
            Kind::Element(_) => {
                node.attrs.retain(|name, _| next.get(name).is_some());
                for (name, value) in next.iter() {
                    match attr_value(value) {
                        Some(json) => {
                            node.attrs.insert(name.to_string(), json);
                        }
                        None => {
                            node.attrs.shift_remove(name);
                        }
                    }
                }
            }
            Kind::Container => {}
        }
        self.ops.push(HostOp::Update {
            handle,
            first: prev.is_none(),
        });
    }

    fn place_host_node(&mut self, handle: HostHandle, parent: HostHandle, before: Option<HostHandle>) {
        if !self.nodes.contains_key(&handle) || !self.nodes.contains_key(&parent) {
            tracing::warn!(handle = handle.0, parent = parent.0, "placement involves an unknown host node");
            return;
        }
        self.detach(handle);
        if let Some(p) = self.nodes.get_mut(&parent) {
            let at = before
                .and_then(|b| p.children.iter().position(|c| *c == b))
                .unwrap_or(p.children.len());
            p.children.insert(at, handle);
        }
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.parent = Some(parent);
        }
        self.ops.push(HostOp::Place {
            handle,
            parent,
            before,
        });
    }

    fn remove_host_node(&mut self, handle: HostHandle) {
        self.detach(handle);
        self.drop_subtree(handle);
        self.ops.push(HostOp::Remove { handle });
    }

    fn before_flush(&mut self) {
        debug_assert!(!self.in_flush, "nested commit batch");
        self.in_flush = true;
    }

    fn after_flush(&mut self) {
        self.in_flush = false;
        self.flushes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(host: &mut MemoryHost, tag: &str, props: Props) -> HostHandle {
        let handle = host.create_host_node(HostNode::Element { tag });
        host.update_host_node(handle, None, &props);
        handle
    }

    fn text(host: &mut MemoryHost, content: &'static str) -> HostHandle {
        let handle = host.create_host_node(HostNode::Text);
        host.update_host_node(handle, None, &Props::text(content));
        handle
    }

    #[test]
    fn builds_markup_in_placement_order() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let ul = element(&mut host, "ul", Props::new().with("class", "list"));
        let a = text(&mut host, "a");
        let b = text(&mut host, "b");

        host.place_host_node(ul, root, None);
        host.place_host_node(b, ul, None);
        host.place_host_node(a, ul, Some(b));

        assert_eq!(host.markup(root), "<ul class=\"list\">ab</ul>");
        assert_eq!(host.text_content(root), "ab");
    }

    #[test]
    fn placing_an_attached_node_moves_it() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let a = text(&mut host, "a");
        let b = text(&mut host, "b");
        host.place_host_node(a, root, None);
        host.place_host_node(b, root, None);

        host.place_host_node(b, root, Some(a));
        assert_eq!(host.children(root), &[b, a]);
    }

    #[test]
    fn removal_drops_the_subtree() {
        let mut host = MemoryHost::new();
        let root = host.root();
        let div = element(&mut host, "div", Props::new());
        let t = text(&mut host, "x");
        host.place_host_node(div, root, None);
        host.place_host_node(t, div, None);

        host.remove_host_node(div);
        assert!(!host.contains(t));
        assert!(host.children(root).is_empty());
        assert!(host.is_empty());
    }

    #[test]
    fn updates_replace_attributes() {
        let mut host = MemoryHost::new();
        let div = element(&mut host, "div", Props::new().with("a", 1).with("b", true));
        let prev = Props::new().with("a", 1).with("b", true);
        host.update_host_node(div, Some(&prev), &Props::new().with("a", 2));

        assert_eq!(host.attr(div, "a"), Some(&json!(2)));
        assert_eq!(host.attr(div, "b"), None);
        assert_eq!(
            host.to_json(div),
            json!({ "tag": "div", "attrs": { "a": 2 }, "children": [] })
        );
    }
}
