//! Commit: applying a walked pass to the host.

use std::borrow::Cow;

use super::{RootWork, Scheduler};
use crate::error::Result;
use crate::host::{HostCommit, HostHandle, HostNode};
use crate::tree::{Node, NodeFlags, NodeId, NodeKind, Snapshot, TextSource};
use crate::view::{Binding, TEXT_PROP};

impl<H: HostCommit> Scheduler<H> {
    pub(super) fn commit_root(&mut self, work: &RootWork) -> Result<()> {
        for &id in &work.deletions {
            self.commit_deletion(id);
        }
        for &id in &work.processed {
            self.commit_node(id)?;
        }
        for &id in &work.processed {
            self.snapshot(id);
        }
        Ok(())
    }

    fn commit_node(&mut self, id: NodeId) -> Result<()> {
        let Some(node) = self.tree.get_node(id) else {
            return Ok(());
        };
        if node.flags.contains(NodeFlags::DELETION) {
            return Ok(());
        }
        let placement = node.flags.contains(NodeFlags::PLACEMENT);

        if !node.kind.is_host() {
            // A moved component or fragment moves the host nodes below it.
            if placement && node.is_committed() {
                let handles = self.top_host_handles(id);
                self.place(id, &handles);
            }
            return Ok(());
        }

        match node.host {
            None => {
                let attrs = node.host_attributes();
                let handle = match &node.kind {
                    NodeKind::Host(tag) => self.host.create_host_node(HostNode::Element { tag }),
                    _ => self.host.create_host_node(HostNode::Text),
                };
                self.host.update_host_node(handle, None, &attrs);

                let node = self.tree.node_mut(id)?;
                node.host = Some(handle);
                node.host_props = Some(attrs);
                tracing::trace!(node = %id, handle = handle.0, "host node created");

                self.sync_bindings(id);
                self.place(id, &[handle]);
            }
            Some(handle) => {
                if node.flags.contains(NodeFlags::UPDATE) {
                    let attrs = node.host_attributes();
                    if node.host_props.as_ref() != Some(&attrs) {
                        self.host
                            .update_host_node(handle, node.host_props.as_ref(), &attrs);
                        self.tree.node_mut(id)?.host_props = Some(attrs);
                    }
                    self.sync_bindings(id);
                }
                if placement {
                    self.place(id, &[handle]);
                }
            }
        }
        Ok(())
    }

    /// Keep one subscription per bound attribute, keyed by attribute name.
    fn sync_bindings(&mut self, id: NodeId) {
        let Some(node) = self.tree.get_node_mut(id) else {
            return;
        };
        if node.flags.contains(NodeFlags::STATIC_HOST) && node.cleanups.is_empty() {
            return;
        }

        let wanted: Vec<(Cow<'static, str>, Binding)> = match &node.kind {
            NodeKind::Text(TextSource::Bound(binding)) => {
                vec![(Cow::Borrowed(TEXT_PROP), binding.clone())]
            }
            NodeKind::Host(_) => node
                .props
                .bindings()
                .map(|(name, binding)| (Cow::Owned(name.to_string()), binding.clone()))
                .collect(),
            _ => Vec::new(),
        };

        node.cleanups.retain(|name, sub| {
            wanted
                .iter()
                .any(|(n, b)| n == name && b.source_id() == sub.source())
        });
        for (name, binding) in wanted {
            if !node.cleanups.contains_key(&name) {
                let sub = binding.watch(self.updates.notifier(id));
                node.cleanups.insert(name, sub);
            }
        }
    }

    fn snapshot(&mut self, id: NodeId) {
        let Some(node) = self.tree.get_node_mut(id) else {
            return;
        };
        if node.flags.contains(NodeFlags::DELETION) {
            return;
        }
        node.prev = Some(Snapshot {
            props: node.props.clone(),
            key: node.key.clone(),
            index: node.index,
        });
        node.flags
            .remove(NodeFlags::PLACEMENT | NodeFlags::UPDATE | NodeFlags::DIRTY);
    }

    /// Tear down the subtree at `id` and remove its host output. Only the
    /// topmost host nodes are removed; nested ones leave with them.
    pub(super) fn commit_deletion(&mut self, id: NodeId) {
        if !self.tree.contains(id) {
            return;
        }
        let handles = self.top_host_handles(id);
        let doomed = self.tree.subtree(id);
        for &node_id in &doomed {
            if let Some(mut node) = self.tree.remove_node(node_id) {
                node.teardown();
            }
        }
        for handle in handles {
            self.host.remove_host_node(handle);
        }
        tracing::trace!(node = %id, nodes = doomed.len(), "subtree removed");
    }

    fn place(&mut self, id: NodeId, handles: &[HostHandle]) {
        if handles.is_empty() {
            return;
        }
        let Some(parent) = self.host_parent(id) else {
            tracing::warn!(node = %id, "no host parent; skipping placement");
            return;
        };
        let before = self.host_sibling(id);
        for &handle in handles {
            self.host.place_host_node(handle, parent, before);
        }
    }

    /// Host nodes directly below `id` (or `id` itself), in order.
    fn top_host_handles(&self, id: NodeId) -> Vec<HostHandle> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.tree.get_node(current) else {
                continue;
            };
            if node.kind.is_host() {
                out.extend(node.host);
                continue;
            }
            let start = stack.len();
            stack.extend(self.tree.children(current).map(Node::id));
            stack[start..].reverse();
        }
        out
    }

    fn host_parent(&self, id: NodeId) -> Option<HostHandle> {
        self.tree
            .ancestors(id)
            .find(|n| n.is_host_parent())
            .and_then(|n| n.host)
    }

    /// The first committed host node after `id` inside the same host parent.
    fn host_sibling(&self, id: NodeId) -> Option<HostHandle> {
        let mut current = id;
        'siblings: loop {
            // Climb until there is a next sibling, stopping at the host parent.
            let next = loop {
                let node = self.tree.get_node(current)?;
                if let Some(sibling) = node.sibling {
                    break sibling;
                }
                let parent = self.tree.get_node(node.parent?)?;
                if parent.is_host_parent() {
                    return None;
                }
                current = parent.id;
            };
            current = next;

            // Descend to the first host node of this sibling.
            loop {
                let node = self.tree.get_node(current)?;
                if node.flags.contains(NodeFlags::PLACEMENT) {
                    continue 'siblings;
                }
                if node.kind.is_host() {
                    match node.host {
                        Some(handle) => return Some(handle),
                        None => continue 'siblings,
                    }
                }
                match node.child {
                    Some(child) => current = child,
                    None => continue 'siblings,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::host::{HostOp, MemoryHost};
    use crate::scheduler::Scheduler;
    use crate::view::{Component, Element, View};

    fn item(key: &'static str) -> View {
        Element::host("li").key(key).child(key).into()
    }

    #[test]
    fn fragments_place_before_the_following_host_node() {
        let mut scheduler = Scheduler::new(MemoryHost::new());
        let container = scheduler.host().root();
        let root = scheduler.mount(
            container,
            vec![View::from("a"), View::from("c")],
        );
        scheduler.flush().unwrap();

        scheduler
            .render(
                root,
                vec![
                    View::from("a"),
                    View::list(["b1", "b2"]),
                    View::from("c"),
                ],
            )
            .unwrap();
        scheduler.flush().unwrap();
        assert_eq!(scheduler.host().text_content(container), "ab1b2c");
    }

    #[test]
    fn moved_components_move_their_host_nodes() {
        let wrap = Component::new("Wrap", |cx| cx.children().into());
        let keyed = |key: &'static str| -> View {
            wrap.element().key(key).children(item(key)).into()
        };

        let mut scheduler = Scheduler::new(MemoryHost::new());
        let container = scheduler.host().root();
        let root = scheduler.mount(container, vec![keyed("a"), keyed("b"), keyed("c")]);
        scheduler.flush().unwrap();
        scheduler.host_mut().take_ops();

        scheduler
            .render(root, vec![keyed("c"), keyed("a"), keyed("b")])
            .unwrap();
        scheduler.flush().unwrap();

        assert_eq!(
            scheduler.host().markup(container),
            "<li>c</li><li>a</li><li>b</li>"
        );
        let places = scheduler.host().ops().iter().filter(|op| op.is_place()).count();
        assert_eq!(places, 1);
        assert!(!scheduler.host().ops().iter().any(HostOp::is_remove));
    }

    #[test]
    fn deletion_removes_only_top_host_nodes() {
        let mut scheduler = Scheduler::new(MemoryHost::new());
        let container = scheduler.host().root();
        let root = scheduler.mount(
            container,
            Element::fragment(vec![
                Element::host("div").child(Element::host("span").child("x")),
                Element::host("p"),
            ]),
        );
        scheduler.flush().unwrap();
        scheduler.host_mut().take_ops();

        scheduler.render(root, ()).unwrap();
        scheduler.flush().unwrap();

        let removed = scheduler.host().ops().iter().filter(|op| op.is_remove()).count();
        assert_eq!(removed, 2);
        assert!(scheduler.host().is_empty());
        assert_eq!(scheduler.tree().node_count(), 1);
    }
}
