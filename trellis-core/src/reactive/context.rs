//! Reactive Context
//!
//! The reactive context records which computation is currently running, so
//! that reading a signal can register the reader as a dependent without the
//! reader subscribing by hand.
//!
//! # Implementation
//!
//! Each thread keeps a stack of scope frames. Entering a scope (a component
//! render, an effect run, or an untracked block) pushes a frame and returns
//! a guard; [`ReactiveContext::finish`] pops it and hands back the
//! subscriptions made while it was on top. Independent render passes on
//! different threads never see each other's frames.
//!
//! Nested scopes shadow their parents: reads inside an effect created during
//! a render are attributed to the effect, not to the rendering node.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use super::subscriber::Subscription;
use crate::tree::NodeId;

/// Callback a scope wants invoked when one of its dependencies changes.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// What kind of computation a scope frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A component of the given node is being evaluated.
    Render(NodeId),
    /// A signal-tracking effect is running.
    Effect,
    /// Reads are plain reads.
    Untracked,
}

struct Frame {
    token: u64,
    kind: ScopeKind,
    notify: Option<Notify>,
    /// Signal IDs already subscribed in this frame.
    seen: SmallVec<[u64; 8]>,
    subscriptions: SmallVec<[Subscription; 4]>,
    /// Set when the rendering node requested its own update mid-render.
    dirtied: bool,
}

/// What a scope collected while it was active.
#[derive(Debug, Default)]
pub struct Tracked {
    pub subscriptions: SmallVec<[Subscription; 4]>,
    pub dirtied: bool,
}

impl Tracked {
    pub fn sources(&self) -> impl Iterator<Item = u64> + '_ {
        self.subscriptions.iter().map(Subscription::source)
    }
}

/// Guard for an entered scope. Dropping it without [`finish`](Self::finish)
/// discards everything the scope collected.
pub struct ReactiveContext {
    token: u64,
    done: bool,
}

impl ReactiveContext {
    /// Enter the render scope of `node`. Signals read in this scope call
    /// `notify` when written.
    pub fn enter_render(node: NodeId, notify: Notify) -> Self {
        Self::push(ScopeKind::Render(node), Some(notify))
    }

    /// Enter an effect scope.
    pub fn enter_effect(notify: Notify) -> Self {
        Self::push(ScopeKind::Effect, Some(notify))
    }

    /// Enter a scope in which reads do not subscribe.
    pub fn enter_untracked() -> Self {
        Self::push(ScopeKind::Untracked, None)
    }

    fn push(kind: ScopeKind, notify: Option<Notify>) -> Self {
        static TOKENS: AtomicU64 = AtomicU64::new(0);
        let token = TOKENS.fetch_add(1, Ordering::Relaxed);

        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                token,
                kind,
                notify,
                seen: SmallVec::new(),
                subscriptions: SmallVec::new(),
                dirtied: false,
            });
        });

        Self { token, done: false }
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let scope = Self::enter_untracked();
        let result = f();
        drop(scope);
        result
    }

    /// Check whether reads would currently be tracked.
    pub fn is_active() -> bool {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|frame| frame.notify.is_some())
        })
    }

    /// Kind of the innermost scope, if any.
    pub fn current() -> Option<ScopeKind> {
        SCOPE_STACK.with(|stack| stack.borrow().last().map(|frame| frame.kind))
    }

    /// Whether a render scope for `node` is open anywhere on this thread.
    pub fn is_rendering(node: NodeId) -> bool {
        SCOPE_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .any(|frame| frame.kind == ScopeKind::Render(node))
        })
    }

    /// Flag the open render scope of `node` as dirtied. Returns `false` when
    /// `node` is not mid-render.
    pub(crate) fn mark_render_dirty(node: NodeId) -> bool {
        SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack
                .iter_mut()
                .rev()
                .find(|frame| frame.kind == ScopeKind::Render(node))
            {
                Some(frame) => {
                    frame.dirtied = true;
                    true
                }
                None => false,
            }
        })
    }

    /// Record a read of `source` in the innermost scope.
    ///
    /// `subscribe` is called at most once per source and scope, with the
    /// scope's notify callback.
    pub(crate) fn track<F>(source: u64, subscribe: F)
    where
        F: FnOnce(Notify) -> Subscription,
    {
        let notify = SCOPE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let frame = stack.last_mut()?;
            let notify = frame.notify.clone()?;
            if frame.seen.contains(&source) {
                return None;
            }
            frame.seen.push(source);
            Some(notify)
        });

        let Some(notify) = notify else {
            return;
        };
        let subscription = subscribe(notify);

        SCOPE_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                frame.subscriptions.push(subscription);
            }
        });
    }

    /// Leave the scope and return what it collected.
    pub fn finish(mut self) -> Tracked {
        self.done = true;
        self.pop()
            .map(|frame| Tracked {
                subscriptions: frame.subscriptions,
                dirtied: frame.dirtied,
            })
            .unwrap_or_default()
    }

    fn pop(&self) -> Option<Frame> {
        let popped = SCOPE_STACK.with(|stack| stack.borrow_mut().pop());

        // Guards are strictly nested; a mismatch means one leaked.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.token, self.token,
                "ReactiveContext mismatch: expected scope {}, got {}",
                self.token, frame.token
            );
        }
        popped
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.done {
            // Subscriptions in the discarded frame cancel as it drops.
            drop(self.pop());
        }
    }
}
