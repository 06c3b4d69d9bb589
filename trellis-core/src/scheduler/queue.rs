//! Update requests and the per-pass work queue.
//!
//! [`UpdateQueue`] is the shared inbox every update request lands in:
//! signal notifications, provider changes, suspense continuations and user
//! calls. It is cheap to clone and safe to call from any thread. The
//! scheduler drains it between units of work into a [`WorkQueue`] ordered by
//! depth, so the shallowest dirty node is always walked first.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::reactive::{Notify, ReactiveContext};
use crate::tree::NodeId;

type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inbox {
    pending: Vec<NodeId>,
    waker: Option<Waker>,
}

/// Shared inbox of update requests.
#[derive(Clone, Default)]
pub struct UpdateQueue {
    inner: Arc<Mutex<Inbox>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for `node` to be re-evaluated.
    ///
    /// A request for a node that is rendering right now on this thread only
    /// marks that render as dirtied; the scheduler re-runs it before moving
    /// on.
    pub fn request(&self, node: NodeId) {
        if ReactiveContext::mark_render_dirty(node) {
            tracing::trace!(node = %node, "update requested mid-render");
            return;
        }

        let wake = {
            let mut inbox = self.inner.lock();
            let was_empty = inbox.pending.is_empty();
            inbox.pending.push(node);
            if was_empty {
                inbox.waker.clone()
            } else {
                None
            }
        };

        if let Some(wake) = wake {
            wake();
        }
    }

    /// Install the callback fired when the inbox goes from empty to
    /// non-empty. Hosts use it to schedule the next flush.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.inner.lock().waker = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        self.inner.lock().waker = None;
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// A handle bound to `node`.
    pub fn handle(&self, node: NodeId) -> UpdateHandle {
        UpdateHandle {
            queue: self.clone(),
            node,
        }
    }

    pub(crate) fn notifier(&self, node: NodeId) -> Notify {
        let queue = self.clone();
        Arc::new(move || queue.request(node))
    }

    pub(crate) fn drain(&self) -> Vec<NodeId> {
        std::mem::take(&mut self.inner.lock().pending)
    }
}

impl fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inbox = self.inner.lock();
        f.debug_struct("UpdateQueue")
            .field("pending", &inbox.pending)
            .field("waker", &inbox.waker.is_some())
            .finish()
    }
}

/// Requests updates of one node.
#[derive(Clone, Debug)]
pub struct UpdateHandle {
    queue: UpdateQueue,
    node: NodeId,
}

impl UpdateHandle {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn request(&self) {
        self.queue.request(self.node);
    }
}

/// Dirty nodes awaiting a walk, shallowest first, then in request order.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    heap: BinaryHeap<Reverse<(usize, u64, NodeId)>>,
    seq: u64,
}

impl WorkQueue {
    pub(crate) fn push(&mut self, node: NodeId, depth: usize) {
        self.seq += 1;
        self.heap.push(Reverse((depth, self.seq, node)));
    }

    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        self.heap.pop().map(|Reverse((_, _, node))| node)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}
