//! Host Commit Interface
//!
//! The scheduler never touches a real rendering target. At commit it calls a
//! [`HostCommit`] implementation with four primitive operations on opaque
//! [`HostHandle`]s, bracketed by [`before_flush`](HostCommit::before_flush)
//! and [`after_flush`](HostCommit::after_flush) once per commit batch.
//!
//! [`MemoryHost`] is an in-memory, DOM-like implementation used by tests and
//! benchmarks.

mod memory;

pub use memory::{HostOp, MemoryHost};

use serde::{Deserialize, Serialize};

use crate::view::Props;

/// Opaque reference to a node owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostHandle(pub u64);

/// What the scheduler asks the host to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostNode<'a> {
    Element { tag: &'a str },
    Text,
}

/// Operations a rendering target implements.
///
/// Attributes (and text content, under the `text` attribute) are applied by
/// [`update_host_node`](Self::update_host_node), which is also called right
/// after creation with no previous props.
pub trait HostCommit {
    fn create_host_node(&mut self, node: HostNode<'_>) -> HostHandle;

    /// Apply `next`. Must be idempotent.
    fn update_host_node(&mut self, handle: HostHandle, prev: Option<&Props>, next: &Props);

    /// Insert or move `handle` into `parent`, before `before` or at the end.
    fn place_host_node(&mut self, handle: HostHandle, parent: HostHandle, before: Option<HostHandle>);

    /// Detach `handle` and everything below it.
    fn remove_host_node(&mut self, handle: HostHandle);

    fn before_flush(&mut self) {}

    fn after_flush(&mut self) {}
}

impl<H: HostCommit + ?Sized> HostCommit for Box<H> {
    fn create_host_node(&mut self, node: HostNode<'_>) -> HostHandle {
        (**self).create_host_node(node)
    }

    fn update_host_node(&mut self, handle: HostHandle, prev: Option<&Props>, next: &Props) {
        (**self).update_host_node(handle, prev, next)
    }

    fn place_host_node(&mut self, handle: HostHandle, parent: HostHandle, before: Option<HostHandle>) {
        (**self).place_host_node(handle, parent, before)
    }

    fn remove_host_node(&mut self, handle: HostHandle) {
        (**self).remove_host_node(handle)
    }

    fn before_flush(&mut self) {
        (**self).before_flush()
    }

    fn after_flush(&mut self) {
        (**self).after_flush()
    }
}
