//! Reconciler
//!
//! Diffs a new child description against a node's existing children and
//! updates the tree in place: matching children are reused, the rest are
//! created or flagged for deletion.
//!
//! # Algorithm
//!
//! A single description is matched against the first old child only.
//!
//! A list is matched in two phases:
//!
//! 1. Walk old and new children in lockstep while their keys agree.
//! 2. Index the remaining old children by `key`, or by position when they
//!    have none, and look each remaining new child up in that map. Whatever
//!    is left in the map afterwards is deleted.
//!
//! A matched child is reused when its type agrees (same host tag, same
//! component, same context, both text); otherwise it is replaced. Reused
//! children whose relative order changed get the Placement flag, chosen so
//! that as few host nodes as possible move (see [`placement`]).
//!
//! Nothing here touches the host. All host work is deferred to commit
//! through node flags and the parent's deletion list.

mod diagnostics;
mod placement;

pub use diagnostics::{check_keys, KeyDiagnostic};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::scheduler::UpdateQueue;
use crate::tree::{Node, NodeFlags, NodeId, NodeKind, TextSource, Tree};
use crate::view::{Element, ElementKind, Key, Props, View};

impl From<ElementKind> for NodeKind {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Host(tag) => NodeKind::Host(tag),
            ElementKind::Component(c) => NodeKind::Component(c),
            ElementKind::Fragment => NodeKind::Fragment,
            ElementKind::Provider(v) => NodeKind::Provider(v),
            ElementKind::Boundary(b) => NodeKind::Boundary(b),
        }
    }
}

fn same_type(node: &NodeKind, element: &ElementKind) -> bool {
    match (node, element) {
        (NodeKind::Host(a), ElementKind::Host(b)) => a == b,
        (NodeKind::Component(a), ElementKind::Component(b)) => a.same_type(b),
        (NodeKind::Fragment, ElementKind::Fragment) => true,
        (NodeKind::Provider(a), ElementKind::Provider(b)) => a.context == b.context,
        (NodeKind::Boundary(_), ElementKind::Boundary(_)) => true,
        _ => false,
    }
}

fn is_static_host(kind: &NodeKind, props: &Props) -> bool {
    match kind {
        NodeKind::Host(_) => !props.has_bindings(),
        NodeKind::Text(TextSource::Static(_)) => true,
        _ => false,
    }
}

fn check_props(element: &Element) -> Result<()> {
    match element.props.duplicate() {
        Some(attr) => {
            let tag = match &element.kind {
                ElementKind::Host(tag) => tag.to_string(),
                ElementKind::Component(c) => c.name().to_string(),
                other => format!("{other:?}"),
            };
            Err(Error::ConflictingBinding {
                tag,
                attr: attr.to_string(),
            })
        }
        None => Ok(()),
    }
}

/// Identity of an old child in the lookup map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

impl SlotKey {
    fn of(key: Option<Key>, index: usize) -> Self {
        match key {
            Some(key) => SlotKey::Key(key),
            None => SlotKey::Index(index),
        }
    }
}

enum Slot {
    Reused(NodeId),
    Rejected(View),
}

/// Child reconciliation over a [`Tree`].
pub struct Reconciler<'a> {
    tree: &'a mut Tree,
    updates: &'a UpdateQueue,
    dev_checks: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(tree: &'a mut Tree, updates: &'a UpdateQueue, dev_checks: bool) -> Self {
        Self {
            tree,
            updates,
            dev_checks,
        }
    }

    /// Replace the children of `parent` with nodes matching `children`.
    ///
    /// Returns the new first child. Removed children are flagged Deletion
    /// and appended to `parent`'s deletion list.
    pub fn reconcile_children(&mut self, parent: NodeId, children: View) -> Result<Option<NodeId>> {
        let old: Vec<NodeId> = self.tree.children(parent).map(Node::id).collect();

        let placed = match children {
            View::Empty => {
                self.delete_all(parent, &old)?;
                Vec::new()
            }
            View::List(items) => self.reconcile_list(parent, &old, items)?,
            single => self.reconcile_single(parent, &old, single)?,
        };

        self.link(parent, &placed)
    }

    fn reconcile_single(
        &mut self,
        parent: NodeId,
        old: &[NodeId],
        view: View,
    ) -> Result<Vec<(NodeId, usize)>> {
        let view = match old.split_first() {
            Some((&head, rest)) => match self.update_slot(head, view)? {
                Slot::Reused(id) => {
                    self.delete_all(parent, rest)?;
                    return Ok(vec![(id, 0)]);
                }
                Slot::Rejected(view) => {
                    self.delete_all(parent, old)?;
                    view
                }
            },
            None => view,
        };

        Ok(self.create(view)?.map(|id| (id, 0)).into_iter().collect())
    }

    fn reconcile_list(
        &mut self,
        parent: NodeId,
        old: &[NodeId],
        mut items: Vec<View>,
    ) -> Result<Vec<(NodeId, usize)>> {
        if self.dev_checks {
            for problem in check_keys(&items) {
                tracing::warn!(parent = %parent, "{problem}");
            }
        }

        // (node, new index, previous index when reused)
        let mut out: Vec<(NodeId, usize, Option<usize>)> = Vec::with_capacity(items.len());
        let mut old_pos = 0;
        let mut new_idx = 0;

        while old_pos < old.len() && new_idx < items.len() {
            let old_id = old[old_pos];
            let node = self.tree.node(old_id)?;
            let old_index = node.index;
            let item = &items[new_idx];
            if old_index != new_idx || item.is_empty() || node.key.as_ref() != item.key() {
                break;
            }

            let view = std::mem::take(&mut items[new_idx]);
            match self.update_slot(old_id, view)? {
                Slot::Reused(id) => out.push((id, new_idx, Some(old_index))),
                Slot::Rejected(view) => {
                    self.delete(parent, old_id)?;
                    if let Some(id) = self.create(view)? {
                        out.push((id, new_idx, None));
                    }
                }
            }
            old_pos += 1;
            new_idx += 1;
        }

        if new_idx == items.len() {
            self.delete_all(parent, &old[old_pos..])?;
        } else if old_pos == old.len() {
            for (idx, item) in items.iter_mut().enumerate().skip(new_idx) {
                if let Some(id) = self.create(std::mem::take(item))? {
                    out.push((id, idx, None));
                }
            }
        } else {
            let mut remaining: IndexMap<SlotKey, NodeId> = IndexMap::with_capacity(old.len() - old_pos);
            for &old_id in &old[old_pos..] {
                let node = self.tree.node(old_id)?;
                let slot = SlotKey::of(node.key.clone(), node.index);
                if let Some(displaced) = remaining.insert(slot, old_id) {
                    self.delete(parent, displaced)?;
                }
            }

            for (idx, item) in items.iter_mut().enumerate().skip(new_idx) {
                let view = std::mem::take(item);
                if view.is_empty() {
                    continue;
                }
                let slot = SlotKey::of(view.key().cloned(), idx);
                let Some(old_id) = remaining.shift_remove(&slot) else {
                    if let Some(id) = self.create(view)? {
                        out.push((id, idx, None));
                    }
                    continue;
                };

                let old_index = self.tree.node(old_id)?.index;
                match self.update_slot(old_id, view)? {
                    Slot::Reused(id) => out.push((id, idx, Some(old_index))),
                    Slot::Rejected(view) => {
                        self.delete(parent, old_id)?;
                        if let Some(id) = self.create(view)? {
                            out.push((id, idx, None));
                        }
                    }
                }
            }

            for (_, old_id) in remaining {
                self.delete(parent, old_id)?;
            }
        }

        let previous: Vec<usize> = out.iter().filter_map(|(_, _, prev)| *prev).collect();
        let mut keep = placement::stable(&previous).into_iter();
        for (id, _, prev) in &out {
            if prev.is_some() && !keep.next().unwrap_or(false) {
                self.tree.node_mut(*id)?.flags.insert(NodeFlags::PLACEMENT);
            }
        }

        Ok(out.into_iter().map(|(id, idx, _)| (id, idx)).collect())
    }

    /// Try to reuse `old_id` for `view`, applying the new description.
    fn update_slot(&mut self, old_id: NodeId, view: View) -> Result<Slot> {
        let node = self.tree.node(old_id)?;
        if node.key.as_ref() != view.key() {
            return Ok(Slot::Rejected(view));
        }
        let compatible = match (&node.kind, &view) {
            (NodeKind::Text(TextSource::Static(_)), View::Text(_)) => true,
            (NodeKind::Text(TextSource::Bound(a)), View::Bound(b)) => a == b,
            (NodeKind::Fragment, View::List(_)) => true,
            (kind, View::Element(el)) => same_type(kind, &el.kind),
            _ => false,
        };
        if !compatible {
            return Ok(Slot::Rejected(view));
        }

        match view {
            View::Element(el) => self.apply_element(old_id, *el)?,
            View::Text(text) => {
                let node = self.tree.node_mut(old_id)?;
                let changed = matches!(&node.kind, NodeKind::Text(TextSource::Static(old)) if *old != text);
                node.kind = NodeKind::Text(TextSource::Static(text));
                node.fresh = true;
                if changed {
                    node.flags.insert(NodeFlags::UPDATE);
                }
            }
            View::Bound(binding) => {
                let node = self.tree.node_mut(old_id)?;
                node.kind = NodeKind::Text(TextSource::Bound(binding));
                node.fresh = true;
            }
            View::List(items) => {
                let node = self.tree.node_mut(old_id)?;
                node.children = View::List(items);
                node.fresh = true;
                node.flags.insert(NodeFlags::UPDATE);
            }
            View::Empty => return Ok(Slot::Rejected(View::Empty)),
        }
        Ok(Slot::Reused(old_id))
    }

    fn apply_element(&mut self, id: NodeId, el: Element) -> Result<()> {
        check_props(&el)?;
        let node = self.tree.node_mut(id)?;

        let mut consumers = Vec::new();
        let update = match (&node.kind, &el.kind) {
            (NodeKind::Host(_), ElementKind::Host(_)) => !node.props.shallow_eq(&el.props),
            (NodeKind::Provider(old), ElementKind::Provider(new)) => {
                if !old.same_value(new) {
                    consumers.extend(node.consumers.iter().copied());
                }
                true
            }
            _ => true,
        };

        node.kind = el.kind.into();
        node.props = el.props;
        node.children = el.children;
        node.fresh = true;
        if update {
            node.flags.insert(NodeFlags::UPDATE);
        }
        let static_host = is_static_host(&node.kind, &node.props);
        node.flags.set(NodeFlags::STATIC_HOST, static_host);

        if !consumers.is_empty() {
            tracing::trace!(provider = %id, consumers = consumers.len(), "context value changed");
        }
        for consumer in consumers {
            self.updates.request(consumer);
        }
        Ok(())
    }

    fn create(&mut self, view: View) -> Result<Option<NodeId>> {
        let (kind, key, props, children) = match view {
            View::Empty => return Ok(None),
            View::Text(text) => (
                NodeKind::Text(TextSource::Static(text)),
                None,
                Props::new(),
                View::Empty,
            ),
            View::Bound(binding) => (
                NodeKind::Text(TextSource::Bound(binding)),
                None,
                Props::new(),
                View::Empty,
            ),
            View::List(items) => (NodeKind::Fragment, None, Props::new(), View::List(items)),
            View::Element(el) => {
                check_props(&el)?;
                let el = *el;
                (el.kind.into(), el.key, el.props, el.children)
            }
        };

        let mut node = Node::new(kind, key, props, children);
        node.flags.insert(NodeFlags::PLACEMENT);
        node.flags
            .set(NodeFlags::STATIC_HOST, is_static_host(&node.kind, &node.props));
        Ok(Some(self.tree.add_node(node)))
    }

    fn delete(&mut self, parent: NodeId, id: NodeId) -> Result<()> {
        let node = self.tree.node_mut(id)?;
        node.flags.insert(NodeFlags::DELETION);
        node.sibling = None;
        self.tree.node_mut(parent)?.deletions.push(id);
        Ok(())
    }

    fn delete_all(&mut self, parent: NodeId, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            self.delete(parent, id)?;
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, placed: &[(NodeId, usize)]) -> Result<Option<NodeId>> {
        let depth = self.tree.node(parent)?.depth + 1;
        for (i, &(id, index)) in placed.iter().enumerate() {
            let next = placed.get(i + 1).map(|&(next, _)| next);
            let node = self.tree.node_mut(id)?;
            node.parent = Some(parent);
            node.depth = depth;
            node.index = index;
            node.sibling = next;
        }

        let first = placed.first().map(|&(id, _)| id);
        self.tree.node_mut(parent)?.child = first;
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Component, Context};

    struct Fixture {
        tree: Tree,
        updates: UpdateQueue,
        parent: NodeId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut tree = Tree::new();
            let parent = tree.add_node(Node::new(
                NodeKind::Host("ul".into()),
                None,
                Props::new(),
                View::Empty,
            ));
            Self {
                tree,
                updates: UpdateQueue::new(),
                parent,
            }
        }

        fn reconcile(&mut self, view: impl Into<View>) -> Result<Vec<NodeId>> {
            Reconciler::new(&mut self.tree, &self.updates, true)
                .reconcile_children(self.parent, view.into())?;
            Ok(self.children())
        }

        fn children(&self) -> Vec<NodeId> {
            self.tree.children(self.parent).map(Node::id).collect()
        }

        /// Forget flags and deletions, as a commit would.
        fn settle(&mut self) {
            let deletions = std::mem::take(&mut self.tree.get_node_mut(self.parent).unwrap().deletions);
            for id in deletions {
                self.tree.remove_node(id);
            }
            for id in self.children() {
                self.tree.get_node_mut(id).unwrap().flags = NodeFlags::empty();
            }
        }

        fn flags(&self, id: NodeId) -> NodeFlags {
            self.tree.get_node(id).unwrap().flags
        }

        fn deletions(&self) -> Vec<NodeId> {
            self.tree.get_node(self.parent).unwrap().deletions.clone()
        }
    }

    fn keyed(keys: &[&'static str]) -> View {
        View::list(keys.iter().map(|k| Element::host("li").key(*k).attr("id", *k)))
    }

    #[test]
    fn keyed_rotation_places_one_node() {
        let mut f = Fixture::new();
        let before = f.reconcile(keyed(&["a", "b", "c"])).unwrap();
        f.settle();

        let after = f.reconcile(keyed(&["c", "a", "b"])).unwrap();
        assert_eq!(after, vec![before[2], before[0], before[1]]);

        let placed: Vec<_> = after
            .iter()
            .filter(|id| f.flags(**id).contains(NodeFlags::PLACEMENT))
            .collect();
        assert_eq!(placed, vec![&before[2]]);
        assert!(f.deletions().is_empty());
    }

    #[test]
    fn unkeyed_swap_updates_in_place() {
        let mut f = Fixture::new();
        let x = || Element::host("li").attr("id", "x");
        let y = || Element::host("li").attr("id", "y");
        let before = f.reconcile(vec![x(), y()]).unwrap();
        f.settle();

        let after = f.reconcile(vec![y(), x()]).unwrap();
        assert_eq!(after, before);
        for id in &after {
            assert!(f.flags(*id).contains(NodeFlags::UPDATE));
            assert!(!f.flags(*id).contains(NodeFlags::PLACEMENT));
        }
    }

    #[test]
    fn removed_and_inserted_children() {
        let mut f = Fixture::new();
        let before = f.reconcile(keyed(&["a", "b", "c"])).unwrap();
        f.settle();

        let after = f.reconcile(keyed(&["a", "d", "c"])).unwrap();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert!(f.flags(after[1]).contains(NodeFlags::PLACEMENT));
        assert!(!f.tree.get_node(after[1]).unwrap().is_committed());
        assert_eq!(f.deletions(), vec![before[1]]);
        assert!(f.flags(before[1]).contains(NodeFlags::DELETION));
    }

    #[test]
    fn type_change_replaces_the_node() {
        let mut f = Fixture::new();
        let before = f.reconcile(Element::host("p")).unwrap();
        f.settle();

        let after = f.reconcile(Element::host("span")).unwrap();
        assert_ne!(after, before);
        assert_eq!(f.deletions(), before);
    }

    #[test]
    fn same_props_do_not_flag_update() {
        let mut f = Fixture::new();
        let el = || Element::host("p").attr("class", "a");
        let before = f.reconcile(el()).unwrap();
        f.settle();

        let after = f.reconcile(el()).unwrap();
        assert_eq!(after, before);
        assert!(!f.flags(after[0]).contains(NodeFlags::UPDATE));
    }

    #[test]
    fn components_always_flag_update() {
        let mut f = Fixture::new();
        let c = Component::new("C", |_| View::Empty.into());
        f.reconcile(c.element()).unwrap();
        f.settle();

        let after = f.reconcile(c.element()).unwrap();
        assert!(f.flags(after[0]).contains(NodeFlags::UPDATE));
    }

    #[test]
    fn text_reuse_flags_changed_content() {
        let mut f = Fixture::new();
        let before = f.reconcile("a").unwrap();
        f.settle();

        let after = f.reconcile("b").unwrap();
        assert_eq!(after, before);
        assert!(f.flags(after[0]).contains(NodeFlags::UPDATE));
    }

    #[test]
    fn nested_lists_become_fragments() {
        let mut f = Fixture::new();
        let ids = f
            .reconcile(View::List(vec![View::from("a"), View::list(["b", "c"])]))
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert!(matches!(
            f.tree.get_node(ids[1]).unwrap().kind(),
            NodeKind::Fragment
        ));
    }

    #[test]
    fn empty_slots_keep_positions() {
        let mut f = Fixture::new();
        let before = f
            .reconcile(View::List(vec![View::from("a"), View::Empty, View::from("c")]))
            .unwrap();
        assert_eq!(f.tree.get_node(before[1]).unwrap().index(), 2);
        f.settle();

        let after = f
            .reconcile(View::List(vec![View::from("a"), View::from("b"), View::from("c")]))
            .unwrap();
        assert_eq!(after.len(), 3);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[1]);
        assert!(f.deletions().is_empty());
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        let mut f = Fixture::new();
        let err = f
            .reconcile(Element::host("div").attr("id", "a").attr("id", "b"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConflictingBinding { ref tag, ref attr } if tag == "div" && attr == "id"
        ));
    }

    #[test]
    fn duplicate_keys_keep_the_last_old_node() {
        let mut f = Fixture::new();
        let before = f.reconcile(keyed(&["a", "a"])).unwrap();
        f.settle();

        let after = f.reconcile(keyed(&["b", "a"])).unwrap();
        assert_eq!(after[1], before[1]);
        assert!(f.deletions().contains(&before[0]));
    }

    #[test]
    fn changed_provider_value_requests_its_consumers() {
        let mut f = Fixture::new();
        let theme = Context::new(0);
        let before = f.reconcile(theme.provide(1, ())).unwrap();
        f.settle();

        let consumer = NodeId::new();
        f.tree
            .get_node_mut(before[0])
            .unwrap()
            .consumers
            .insert(consumer);

        f.reconcile(theme.provide(1, ())).unwrap();
        assert!(f.updates.is_empty());

        f.reconcile(theme.provide(2, ())).unwrap();
        assert_eq!(f.updates.drain(), vec![consumer]);
    }
}
