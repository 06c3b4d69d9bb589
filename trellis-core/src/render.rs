//! Component Rendering
//!
//! A component is a function from a [`RenderCx`] to a [`RenderOutcome`].
//! The context is the explicit handle a render function gets to its node:
//! props, children, per-node hook storage, context lookup and update
//! requests.
//!
//! # Outcomes
//!
//! - `Ready(view)`: the children description.
//! - `Setup(render)`: the function was a setup phase. `render` is cached on
//!   the node and called immediately, and on every later render instead of
//!   the component function.
//! - `Pending(suspension)`: cannot render until the suspension resolves; the
//!   nearest boundary shows its fallback meanwhile.
//! - `Failed(error)`: recovered by the nearest boundary unless fatal.
//!
//! # Hooks
//!
//! Hook storage is a slot list indexed by call order, reset to the start of
//! the list (or to the end of the setup slots) at every render. Calling hooks
//! in a different order across renders is a logic error; a slot of the wrong
//! kind is replaced and logged.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{join_all, FutureExt, LocalBoxFuture};
use smallvec::SmallVec;

use crate::error::RenderError;
use crate::reactive::{Cleanup, Effect, Memo, Resource, Signal};
use crate::scheduler::{UpdateHandle, UpdateQueue};
use crate::tree::{Node, NodeId, NodeKind, Tree};
use crate::view::{Component, Context, Element, Props, Value, View};

/// A render function.
pub type RenderFn = Rc<dyn Fn(&mut RenderCx<'_>) -> RenderOutcome>;

/// Teardown returned by a lifecycle effect.
pub type Teardown = Box<dyn FnOnce()>;

/// Result of calling a render function.
pub enum RenderOutcome {
    Ready(View),
    Setup(RenderFn),
    Pending(Suspension),
    Failed(RenderError),
}

impl RenderOutcome {
    /// Finish a setup phase with the given render function.
    pub fn setup<F>(render: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> RenderOutcome + 'static,
    {
        RenderOutcome::Setup(Rc::new(render))
    }
}

impl From<View> for RenderOutcome {
    fn from(view: View) -> Self {
        RenderOutcome::Ready(view)
    }
}

impl From<Element> for RenderOutcome {
    fn from(el: Element) -> Self {
        RenderOutcome::Ready(el.into())
    }
}

impl From<&'static str> for RenderOutcome {
    fn from(text: &'static str) -> Self {
        RenderOutcome::Ready(text.into())
    }
}

impl From<String> for RenderOutcome {
    fn from(text: String) -> Self {
        RenderOutcome::Ready(text.into())
    }
}

impl From<RenderError> for RenderOutcome {
    fn from(err: RenderError) -> Self {
        RenderOutcome::Failed(err)
    }
}

impl From<Suspension> for RenderOutcome {
    fn from(suspension: Suspension) -> Self {
        RenderOutcome::Pending(suspension)
    }
}

impl fmt::Debug for RenderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderOutcome::Ready(view) => f.debug_tuple("Ready").field(view).finish(),
            RenderOutcome::Setup(_) => f.write_str("Setup"),
            RenderOutcome::Pending(_) => f.write_str("Pending"),
            RenderOutcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Something a component is waiting on.
pub struct Suspension {
    wait: LocalBoxFuture<'static, ()>,
}

impl Suspension {
    pub fn new(wait: impl Future<Output = ()> + 'static) -> Self {
        Self {
            wait: wait.boxed_local(),
        }
    }

    /// A suspension that is already resolved.
    pub fn ready() -> Self {
        Self::new(futures_util::future::ready(()))
    }

    /// Resolves once every suspension in `all` has resolved.
    pub fn all(all: impl IntoIterator<Item = Suspension>) -> Self {
        let waits: Vec<_> = all.into_iter().map(|s| s.wait).collect();
        Self::new(join_all(waits).map(|_| ()))
    }

    pub fn into_future(self) -> LocalBoxFuture<'static, ()> {
        self.wait
    }
}

impl fmt::Debug for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Suspension")
    }
}

// ----------------------------------------------------------------------------
// Hook storage
// ----------------------------------------------------------------------------

pub(crate) enum HookSlot {
    /// A persistent value, optionally owning a reactive effect.
    Value {
        value: Box<dyn Any>,
        owned: Option<Effect>,
    },
    /// A lifecycle effect's last dependencies and teardown.
    Lifecycle {
        deps: Box<dyn Any>,
        teardown: Option<Teardown>,
    },
}

fn release(slot: HookSlot) {
    match slot {
        HookSlot::Value {
            owned: Some(effect),
            ..
        } => effect.dispose(),
        HookSlot::Lifecycle {
            teardown: Some(teardown),
            ..
        } => teardown(),
        _ => {}
    }
}

/// Per-node hook slots.
#[derive(Default)]
pub(crate) struct Hooks {
    slots: Vec<HookSlot>,
    /// First slot used by the cached render function of a setup component.
    pub(crate) render_base: usize,
}

impl Hooks {
    fn put(&mut self, index: usize, slot: HookSlot) {
        if index < self.slots.len() {
            let old = std::mem::replace(&mut self.slots[index], slot);
            release(old);
        } else {
            self.slots.push(slot);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn take_teardown(&mut self, index: usize) -> Option<Teardown> {
        match self.slots.get_mut(index) {
            Some(HookSlot::Lifecycle { teardown, .. }) => teardown.take(),
            _ => None,
        }
    }

    /// Store a lifecycle teardown. Hands it back if the slot is gone.
    pub(crate) fn store_teardown(&mut self, index: usize, next: Teardown) -> Option<Teardown> {
        match self.slots.get_mut(index) {
            Some(HookSlot::Lifecycle { teardown, .. }) => {
                *teardown = Some(next);
                None
            }
            _ => Some(next),
        }
    }

    /// Run every teardown and dispose every owned effect.
    pub(crate) fn teardown(&mut self) {
        for slot in self.slots.drain(..) {
            release(slot);
        }
        self.render_base = 0;
    }
}

/// When a lifecycle effect runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EffectTier {
    /// After commit, before the pass is considered settled.
    Layout,
    /// Once the tree has settled.
    Passive,
}

/// A lifecycle effect queued by a render, run after commit.
pub(crate) struct PendingEffect {
    pub(crate) slot: usize,
    pub(crate) tier: EffectTier,
    pub(crate) run: Box<dyn FnOnce() -> Option<Teardown>>,
}

// ----------------------------------------------------------------------------
// Render context
// ----------------------------------------------------------------------------

/// The handle a render function gets to its node.
pub struct RenderCx<'a> {
    node: &'a Node,
    tree: &'a Tree,
    updates: &'a UpdateQueue,
    hooks: &'a mut Hooks,
    cursor: usize,
    effects: &'a mut Vec<PendingEffect>,
    consumed: &'a mut SmallVec<[NodeId; 2]>,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        node: &'a Node,
        tree: &'a Tree,
        updates: &'a UpdateQueue,
        hooks: &'a mut Hooks,
        effects: &'a mut Vec<PendingEffect>,
        consumed: &'a mut SmallVec<[NodeId; 2]>,
    ) -> Self {
        Self {
            node,
            tree,
            updates,
            hooks,
            cursor: 0,
            effects,
            consumed,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node.id()
    }

    pub fn props(&self) -> &Props {
        self.node.props()
    }

    pub fn prop(&self, name: &str) -> Option<&Value> {
        self.node.props().get(name)
    }

    /// The children passed to this component.
    pub fn children(&self) -> View {
        self.node.children.clone()
    }

    /// A handle that requests a re-render of this node.
    pub fn update_handle(&self) -> UpdateHandle {
        self.updates.handle(self.node.id())
    }

    fn next_slot(&mut self) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        index
    }

    fn persistent<T, F>(&mut self, init: F) -> T
    where
        T: Clone + 'static,
        F: FnOnce() -> (T, Option<Effect>),
    {
        let index = self.next_slot();
        match self.hooks.slots.get(index) {
            Some(HookSlot::Value { value, .. }) => {
                if let Some(value) = value.downcast_ref::<T>() {
                    return value.clone();
                }
                tracing::warn!(node = %self.node.id(), slot = index, "hook slot changed type between renders");
            }
            Some(HookSlot::Lifecycle { .. }) => {
                tracing::warn!(node = %self.node.id(), slot = index, "hook order changed between renders");
            }
            None => {}
        }

        let (value, owned) = init();
        self.hooks.put(
            index,
            HookSlot::Value {
                value: Box::new(value.clone()),
                owned,
            },
        );
        value
    }

    /// A value created on first render and returned unchanged afterwards.
    pub fn use_hook<T: Clone + 'static>(&mut self, init: impl FnOnce() -> T) -> T {
        self.persistent(|| (init(), None))
    }

    /// A signal owned by this node.
    pub fn use_signal<T>(&mut self, init: impl FnOnce() -> T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.use_hook(|| Signal::new(init()))
    }

    /// A memo owned by this node. Later renders reuse the first closure.
    pub fn use_memo<T, F>(&mut self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.persistent(|| {
            let memo = Memo::new(compute);
            let effect = memo.effect().clone();
            (memo, Some(effect))
        })
    }

    /// A signal-tracking effect owned by this node, disposed with it.
    pub fn use_reactive_effect<F>(&mut self, run: F) -> Effect
    where
        F: FnMut() -> Option<Cleanup> + Send + 'static,
    {
        self.persistent(|| {
            let effect = Effect::new(run);
            (effect.clone(), Some(effect))
        })
    }

    /// An async resource owned by this node.
    pub fn use_resource<T>(&mut self) -> Resource<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.use_hook(Resource::new)
    }

    /// Run `effect` after the pass settles, whenever `deps` changed.
    pub fn use_effect<D, F>(&mut self, deps: D, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Teardown> + 'static,
    {
        self.lifecycle(EffectTier::Passive, deps, Box::new(effect));
    }

    /// Run `effect` right after commit, whenever `deps` changed. Updates it
    /// requests are processed before the pass is considered settled.
    pub fn use_layout_effect<D, F>(&mut self, deps: D, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Teardown> + 'static,
    {
        self.lifecycle(EffectTier::Layout, deps, Box::new(effect));
    }

    fn lifecycle<D: PartialEq + 'static>(
        &mut self,
        tier: EffectTier,
        deps: D,
        run: Box<dyn FnOnce() -> Option<Teardown>>,
    ) {
        let index = self.next_slot();
        match self.hooks.slots.get_mut(index) {
            Some(HookSlot::Lifecycle { deps: old, .. }) => {
                if old.downcast_ref::<D>() == Some(&deps) {
                    return;
                }
                *old = Box::new(deps);
            }
            Some(HookSlot::Value { .. }) => {
                tracing::warn!(node = %self.node.id(), slot = index, "hook order changed between renders");
                self.hooks.put(
                    index,
                    HookSlot::Lifecycle {
                        deps: Box::new(deps),
                        teardown: None,
                    },
                );
            }
            None => self.hooks.put(
                index,
                HookSlot::Lifecycle {
                    deps: Box::new(deps),
                    teardown: None,
                },
            ),
        }
        self.effects.push(PendingEffect {
            slot: index,
            tier,
            run,
        });
    }

    /// Value of the nearest provider of `context` above this node, or the
    /// context's default. The node re-renders when that provider's value
    /// changes.
    pub fn use_context<T>(&mut self, context: &Context<T>) -> T
    where
        T: Clone + PartialEq + 'static,
    {
        let provider = self.tree.ancestors(self.node.id()).find_map(|n| match &n.kind {
            NodeKind::Provider(value) if value.context == context.id() => Some((n.id(), value)),
            _ => None,
        });

        match provider {
            Some((id, value)) => {
                if !self.consumed.contains(&id) {
                    self.consumed.push(id);
                }
                value.get::<T>().unwrap_or_else(|| context.default_value())
            }
            None => context.default_value(),
        }
    }
}

/// Call a component, honouring a cached render function.
///
/// Returns the outcome and, when the component finished its setup phase,
/// the render function to cache.
pub(crate) fn invoke(
    cx: &mut RenderCx<'_>,
    component: &Component,
    cached: Option<RenderFn>,
) -> (RenderOutcome, Option<RenderFn>) {
    let nested = || RenderOutcome::Failed(RenderError::new("a render function returned another setup phase"));

    if let Some(render) = cached {
        cx.cursor = cx.hooks.render_base;
        return match render(cx) {
            RenderOutcome::Setup(_) => (nested(), None),
            outcome => (outcome, None),
        };
    }

    cx.cursor = 0;
    match (component.render_fn())(cx) {
        RenderOutcome::Setup(render) => {
            cx.hooks.render_base = cx.cursor;
            let outcome = match render(cx) {
                RenderOutcome::Setup(_) => nested(),
                outcome => outcome,
            };
            (outcome, Some(render))
        }
        outcome => (outcome, None),
    }
}
