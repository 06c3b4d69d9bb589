//! Lifecycle effect queues.
//!
//! Effects are collected as nodes complete, in completion order, so a child's
//! effects run before its parent's. Layout effects run right after each
//! commit; passive effects run once no more passes are pending.

use super::Scheduler;
use crate::host::HostCommit;
use crate::render::{EffectTier, PendingEffect};
use crate::tree::{Node, NodeFlags, NodeId};

#[derive(Default)]
pub(super) struct EffectQueue {
    layout: Vec<(NodeId, PendingEffect)>,
    passive: Vec<(NodeId, PendingEffect)>,
}

impl EffectQueue {
    pub(super) fn collect(&mut self, node: &mut Node) {
        for effect in node.effects.drain(..) {
            match effect.tier {
                EffectTier::Layout => self.layout.push((node.id, effect)),
                EffectTier::Passive => self.passive.push((node.id, effect)),
            }
        }
    }

    pub(super) fn has_passive(&self) -> bool {
        !self.passive.is_empty()
    }

    pub(super) fn clear(&mut self) {
        self.layout.clear();
        self.passive.clear();
    }
}

impl<H: HostCommit> Scheduler<H> {
    pub(super) fn run_layout_effects(&mut self) {
        let batch = std::mem::take(&mut self.effects.layout);
        self.run_effects(batch, EffectTier::Layout);
    }

    pub(super) fn run_passive_effects(&mut self) {
        let batch = std::mem::take(&mut self.effects.passive);
        self.run_effects(batch, EffectTier::Passive);
    }

    fn run_effects(&mut self, batch: Vec<(NodeId, PendingEffect)>, tier: EffectTier) {
        if batch.is_empty() {
            return;
        }
        tracing::debug!(?tier, count = batch.len(), "running effects");

        for (id, effect) in batch {
            let Some(node) = self.tree.get_node_mut(id) else {
                continue;
            };
            if node.flags.contains(NodeFlags::DELETION) {
                continue;
            }
            if let Some(previous) = node.hooks.take_teardown(effect.slot) {
                previous();
            }

            let Some(teardown) = (effect.run)() else {
                continue;
            };
            // The node may have been torn down by the effect itself.
            let rejected = match self.tree.get_node_mut(id) {
                Some(node) => node.hooks.store_teardown(effect.slot, teardown),
                None => Some(teardown),
            };
            if let Some(teardown) = rejected {
                teardown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::host::MemoryHost;
    use crate::render::{RenderOutcome, Teardown};
    use crate::scheduler::Scheduler;
    use crate::view::{Component, Element, View};

    type Log = Rc<RefCell<Vec<String>>>;

    fn logging(name: &'static str, log: &Log, child: Option<Component>) -> Component {
        let log = log.clone();
        Component::new(name, move |cx| {
            let layout_log = log.clone();
            cx.use_layout_effect((), move || {
                layout_log.borrow_mut().push(format!("layout {name}"));
                None
            });
            let passive_log = log.clone();
            cx.use_effect((), move || {
                passive_log.borrow_mut().push(format!("passive {name}"));
                let log = passive_log.clone();
                let cleanup: Teardown = Box::new(move || log.borrow_mut().push(format!("cleanup {name}")));
                Some(cleanup)
            });
            match &child {
                Some(c) => RenderOutcome::Ready(c.element().into()),
                None => View::Empty.into(),
            }
        })
    }

    #[test]
    fn children_run_before_parents_and_layout_before_passive() {
        let log: Log = Rc::default();
        let inner = logging("inner", &log, None);
        let outer = logging("outer", &log, Some(inner));

        let mut scheduler = Scheduler::new(MemoryHost::new());
        let container = scheduler.host().root();
        let root = scheduler.mount(container, outer.element());
        scheduler.flush().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "layout inner",
                "layout outer",
                "passive inner",
                "passive outer"
            ]
        );

        log.borrow_mut().clear();
        scheduler.render(root, Element::host("p")).unwrap();
        scheduler.flush().unwrap();
        let mut cleanups = log.borrow().clone();
        cleanups.sort();
        assert_eq!(cleanups, vec!["cleanup inner", "cleanup outer"]);
    }

    #[test]
    fn unchanged_deps_skip_the_effect() {
        let runs = Rc::new(RefCell::new(0));
        let counted = runs.clone();
        let comp = Component::new("Once", move |cx| {
            let runs = counted.clone();
            cx.use_effect(1, move || {
                *runs.borrow_mut() += 1;
                None
            });
            View::Empty.into()
        });

        let mut scheduler = Scheduler::new(MemoryHost::new());
        let container = scheduler.host().root();
        let root = scheduler.mount(container, comp.element());
        scheduler.flush().unwrap();

        let node = scheduler.tree().get_node(root).and_then(|n| n.first_child()).unwrap();
        scheduler.request_update(node);
        scheduler.flush().unwrap();
        assert_eq!(*runs.borrow(), 1);
    }
}
