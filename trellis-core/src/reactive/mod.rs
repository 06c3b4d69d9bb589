//! Reactive Primitives
//!
//! Signals, memos, effects, and async resources. These are the sources of
//! change that drive re-rendering.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read inside a
//! tracking scope (a component render or an effect), the scope is subscribed
//! to it. Writing a different value notifies every subscriber synchronously.
//!
//! ## Memos
//!
//! A Memo is a derived value. It recomputes when an input changes and only
//! notifies its own readers when the result differs.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! ## Resources
//!
//! A Resource wraps an async fetch whose progress is published on a signal.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local stack of scopes. Reading a signal
//! asks the innermost scope for its notify callback and hands the resulting
//! [`Subscription`] to that scope. The scheduler owns render scopes; effects
//! own theirs.

mod context;
mod effect;
mod memo;
mod resource;
mod signal;
mod subscriber;

pub use context::{Notify, ReactiveContext, ScopeKind, Tracked};
pub use effect::{Cleanup, Effect};
pub use memo::Memo;
pub use resource::{AbortSignal, LoadState, Resource};
pub use signal::{Signal, Trackable};
pub use subscriber::{SubscriberId, Subscription};
