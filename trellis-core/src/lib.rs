//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis component UI engine.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects, async resources)
//! - A persistent node tree with keyed child reconciliation
//! - A depth-ordered update scheduler with a batched host commit
//! - Error and suspense boundaries, context providers and lifecycle hooks
//!
//! Rendering targets are abstracted behind [`HostCommit`]; [`MemoryHost`] is
//! an in-memory DOM used by the tests and benchmarks.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: signals, memos, effects and dependency tracking
//! - `view`: element descriptions, props, components and keys
//! - `tree`: the persistent node tree rendered descriptions live in
//! - `render`: the render context and hook storage components use
//! - `reconciler`: diffing descriptions against existing children
//! - `scheduler`: the work loop, commit and lifecycle effects
//! - `host`: the host mutation interface
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{Component, Element, MemoryHost, Scheduler};
//!
//! let counter = Component::new("Counter", |cx| {
//!     let count = cx.use_signal(|| 0i64);
//!     Element::host("button")
//!         .attr("clicks", count.clone())
//!         .child(count)
//!         .into()
//! });
//!
//! let mut scheduler = Scheduler::new(MemoryHost::new());
//! let container = scheduler.host().root();
//! scheduler.mount(container, counter.element());
//! scheduler.flush().unwrap();
//!
//! assert_eq!(
//!     scheduler.host().markup(container),
//!     "<button clicks=\"0\">0</button>"
//! );
//! ```

pub mod config;
pub mod error;
pub mod host;
pub mod reactive;
pub mod reconciler;
pub mod render;
pub mod scheduler;
pub mod tree;
pub mod view;

pub use config::Config;
pub use error::{Error, RenderError, Result};
pub use host::{HostCommit, HostHandle, HostNode, HostOp, MemoryHost};
pub use reactive::{AbortSignal, Effect, LoadState, Memo, Resource, Signal};
pub use reconciler::{check_keys, KeyDiagnostic};
pub use render::{RenderCx, RenderOutcome, Suspension, Teardown};
pub use scheduler::{Phase, Scheduler, UpdateHandle, UpdateQueue};
pub use tree::{Node, NodeFlags, NodeId, NodeKind, Tree};
pub use view::{
    Binding, Boundary, Caught, Component, Context, Element, Handler, Key, Props, Value, View,
};
