//! Update Scheduler
//!
//! The scheduler turns update requests into committed host mutations.
//!
//! # Algorithm
//!
//! A flush runs passes until nothing is dirty:
//!
//! 1. Drain the [`UpdateQueue`] inbox: every requested node is flagged Dirty
//!    and queued by depth.
//! 2. Pop the shallowest dirty node and walk its subtree in pre-order. A
//!    component renders only if it is new, dirty or received changed props;
//!    otherwise it bails out and its subtree is skipped. Render output is
//!    reconciled into the node's children, which are walked next. Requests
//!    made meanwhile are absorbed between units of work.
//! 3. Repeat 2 until the queue is empty, then commit every walked root:
//!    deletions first, then host creation, updates and placement in walk
//!    order, inside one `before_flush`/`after_flush` batch.
//! 4. Run layout effects. If they dirtied the tree, start another pass.
//! 5. Once nothing is dirty, run passive effects; they too may start another
//!    pass. Consecutive passes are bounded by `Config::max_dirty_passes`,
//!    and so is the number of times one node is walked again within a pass.
//!
//! # Errors and suspense
//!
//! A component returning `Failed` or `Pending` unwinds to the nearest
//! boundary above it that is not already showing its fallback. The boundary
//! renders its fallback in place of its children and the walk continues
//! there. A pending boundary is re-requested when the suspension resolves;
//! [`Scheduler::settle`] drives those continuations.

mod commit;
mod effects;
mod queue;

pub use queue::{UpdateHandle, UpdateQueue};

use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use futures_util::future::{FutureExt, LocalBoxFuture};
use futures_util::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::config::Config;
use crate::error::{Error, RenderError, Result};
use crate::host::{HostCommit, HostHandle};
use crate::reactive::ReactiveContext;
use crate::reconciler::Reconciler;
use crate::render::{self, RenderCx, RenderOutcome, Suspension};
use crate::tree::{Fault, Node, NodeFlags, NodeId, NodeKind, Tree};
use crate::view::{Caught, View};
use effects::EffectQueue;
use queue::WorkQueue;

/// What the scheduler is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing to do.
    Idle,
    /// Updates are waiting for the next flush.
    Queued,
    /// Rendering and reconciling.
    Working,
    /// Applying host mutations.
    Committing,
}

/// Nodes walked from one root during a pass.
struct RootWork {
    root: NodeId,
    processed: IndexSet<NodeId>,
    deletions: Vec<NodeId>,
}

impl RootWork {
    fn new(root: NodeId) -> Self {
        Self {
            root,
            processed: IndexSet::new(),
            deletions: Vec::new(),
        }
    }
}

enum Step {
    /// Continue with this child, or complete the node when `None`.
    Child(Option<NodeId>),
    /// A boundary took over; continue inside its fallback.
    Unwound {
        boundary: NodeId,
        child: Option<NodeId>,
    },
}

#[derive(Clone, Copy)]
enum Unit {
    Component,
    Boundary,
    Text,
    Container,
}

/// Drives rendering and commits into a host.
pub struct Scheduler<H: HostCommit> {
    tree: Tree,
    host: H,
    config: Config,
    updates: UpdateQueue,
    work: WorkQueue,
    phase: Phase,
    /// Nodes walked in the current pass.
    rendered: HashSet<NodeId>,
    /// Times a node was walked again within the current pass.
    rewalks: HashMap<NodeId, usize>,
    /// Deletions collected by a pass that never reached its commit.
    stranded: Vec<NodeId>,
    effects: EffectQueue,
    continuations: FuturesUnordered<LocalBoxFuture<'static, ()>>,
    uncaught: Vec<RenderError>,
    after_work: VecDeque<Box<dyn FnOnce()>>,
}

impl<H: HostCommit> Scheduler<H> {
    /// Create a scheduler with the default configuration.
    pub fn new(host: H) -> Self {
        Self::build(host, Config::default())
    }

    /// Create a scheduler with a validated configuration.
    pub fn with_config(host: H, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(host, config))
    }

    fn build(host: H, config: Config) -> Self {
        Self {
            tree: Tree::new(),
            host,
            config,
            updates: UpdateQueue::new(),
            work: WorkQueue::default(),
            phase: Phase::Idle,
            rendered: HashSet::new(),
            rewalks: HashMap::new(),
            stranded: Vec::new(),
            effects: EffectQueue::default(),
            continuations: FuturesUnordered::new(),
            uncaught: Vec::new(),
            after_work: VecDeque::new(),
        }
    }

    /// Mount `view` into `container`. Nothing renders until the next flush.
    pub fn mount(&mut self, container: HostHandle, view: impl Into<View>) -> NodeId {
        let root = self.tree.add_node(Node::root(container, view.into()));
        tracing::debug!(root = %root, container = container.0, "mounted root");
        self.updates.request(root);
        root
    }

    /// Replace the description rendered by `root`.
    pub fn render(&mut self, root: NodeId, view: impl Into<View>) -> Result<()> {
        let node = self.tree.node_mut(root)?;
        node.children = view.into();
        node.fresh = true;
        self.updates.request(root);
        Ok(())
    }

    /// Tear down `root` and remove its host output.
    pub fn unmount(&mut self, root: NodeId) -> Result<()> {
        self.tree.node(root)?;
        self.host.before_flush();
        self.commit_deletion(root);
        self.host.after_flush();
        tracing::debug!(root = %root, "unmounted root");
        Ok(())
    }

    /// Ask for `node` to be re-evaluated at the next flush.
    pub fn request_update(&self, node: NodeId) {
        self.updates.request(node);
    }

    /// The shared request inbox.
    pub fn updates(&self) -> &UpdateQueue {
        &self.updates
    }

    /// Run `callback` once the current (or next) flush has settled.
    pub fn run_after(&mut self, callback: impl FnOnce() + 'static) {
        self.after_work.push_back(Box::new(callback));
    }

    pub fn phase(&self) -> Phase {
        match self.phase {
            Phase::Idle if !self.updates.is_empty() || !self.work.is_empty() => Phase::Queued,
            phase => phase,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Render errors that reached no boundary since the last call.
    pub fn take_uncaught_errors(&mut self) -> Vec<RenderError> {
        std::mem::take(&mut self.uncaught)
    }

    /// Suspensions still waiting to resolve.
    pub fn pending_suspensions(&self) -> usize {
        self.continuations.len()
    }

    /// Process every pending update until the tree settles.
    pub fn flush(&mut self) -> Result<()> {
        let result = self.run_until_settled();
        self.phase = Phase::Idle;
        match result {
            Ok(()) => {
                while let Some(callback) = self.after_work.pop_front() {
                    callback();
                }
                Ok(())
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Flush, then keep flushing as suspensions resolve until none remain.
    pub async fn settle(&mut self) -> Result<()> {
        self.flush()?;
        while let Some(()) = self.continuations.next().await {
            self.flush()?;
        }
        Ok(())
    }

    fn run_until_settled(&mut self) -> Result<()> {
        let mut passes = 0;
        loop {
            self.absorb_requests()?;
            if !self.work.is_empty() {
                if passes == self.config.max_dirty_passes {
                    return Err(Error::UpdateLoop {
                        limit: self.config.max_dirty_passes,
                    });
                }
                passes += 1;
                self.perform_pass()?;
                continue;
            }
            if !self.effects.has_passive() {
                return Ok(());
            }
            self.run_passive_effects();
        }
    }

    fn perform_pass(&mut self) -> Result<()> {
        self.phase = Phase::Working;
        let mut roots = Vec::new();
        if let Err(err) = self.walk_roots(&mut roots) {
            self.stranded.extend(roots.into_iter().flat_map(|work| work.deletions));
            return Err(err);
        }

        self.phase = Phase::Committing;
        self.host.before_flush();
        let committed = roots.iter().try_for_each(|work| self.commit_root(work));
        self.host.after_flush();
        if let Err(err) = committed {
            self.stranded.extend(roots.into_iter().flat_map(|work| work.deletions));
            return Err(err);
        }
        self.rendered.clear();
        self.rewalks.clear();

        tracing::debug!(
            roots = roots.len(),
            processed = roots.iter().map(|w| w.processed.len()).sum::<usize>(),
            deleted = roots.iter().map(|w| w.deletions.len()).sum::<usize>(),
            "pass committed"
        );

        self.run_layout_effects();
        Ok(())
    }

    fn walk_roots(&mut self, roots: &mut Vec<RootWork>) -> Result<()> {
        while let Some(root) = self.next_root()? {
            let mut work = RootWork::new(root);
            let walked = self.walk(&mut work);
            roots.push(work);
            walked?;
        }
        Ok(())
    }

    /// Drop the failed pass. Subtrees it already detached are torn down and
    /// removed from the host; everything else keeps its last commit.
    fn abort(&mut self, err: &Error) {
        let stranded = std::mem::take(&mut self.stranded);
        tracing::debug!(error = %err, stranded = stranded.len(), "pass aborted");
        if !stranded.is_empty() {
            self.host.before_flush();
            for id in stranded {
                self.commit_deletion(id);
            }
            self.host.after_flush();
        }
        self.work.clear();
        self.rendered.clear();
        self.rewalks.clear();
        self.effects.clear();
        for node in self.tree.nodes_mut() {
            node.flags.remove(NodeFlags::DIRTY);
            node.effects.clear();
        }
    }

    fn absorb_requests(&mut self) -> Result<()> {
        for id in self.updates.drain() {
            let Some(node) = self.tree.get_node_mut(id) else {
                tracing::trace!(node = %id, "update for a removed node");
                continue;
            };
            if node.flags.contains(NodeFlags::DELETION) {
                continue;
            }
            let again = self.rendered.remove(&id);
            if node.flags.contains(NodeFlags::DIRTY) && !again {
                continue;
            }
            node.flags.insert(NodeFlags::DIRTY);
            let depth = node.depth;
            if again {
                let rewalks = self.rewalks.entry(id).or_insert(0);
                *rewalks += 1;
                if *rewalks >= self.config.max_dirty_passes {
                    tracing::warn!(node = %id, rewalks = *rewalks, "node keeps being dirtied within one pass");
                    return Err(Error::UpdateLoop {
                        limit: self.config.max_dirty_passes,
                    });
                }
            }
            self.work.push(id, depth);
        }
        Ok(())
    }

    fn next_root(&mut self) -> Result<Option<NodeId>> {
        loop {
            self.absorb_requests()?;
            let Some(id) = self.work.pop() else {
                return Ok(None);
            };
            match self.tree.get_node(id) {
                Some(node)
                    if node.flags.contains(NodeFlags::DIRTY)
                        && !node.flags.contains(NodeFlags::DELETION)
                        && !self.rendered.contains(&id) =>
                {
                    return Ok(Some(id))
                }
                _ => continue,
            }
        }
    }

    fn walk(&mut self, work: &mut RootWork) -> Result<()> {
        let mut next = Some(work.root);

        while let Some(id) = next {
            self.absorb_requests()?;
            next = match self.begin_work(id, work)? {
                Step::Child(Some(child)) => Some(child),
                Step::Child(None) => self.complete(id, work),
                Step::Unwound { boundary, child } => {
                    if !self.tree.is_within(boundary, work.root) {
                        tracing::trace!(from = %work.root, to = %boundary, "boundary above the root; widening");
                        work.root = boundary;
                    }
                    match child {
                        Some(child) => Some(child),
                        None => self.complete(boundary, work),
                    }
                }
            };
        }
        Ok(())
    }

    /// Finish `id` and climb until a sibling is found.
    fn complete(&mut self, id: NodeId, work: &RootWork) -> Option<NodeId> {
        let mut current = id;
        loop {
            let node = self.tree.get_node_mut(current)?;
            self.effects.collect(node);
            if current == work.root {
                return None;
            }
            if let Some(sibling) = node.sibling {
                return Some(sibling);
            }
            current = node.parent?;
        }
    }

    fn begin_work(&mut self, id: NodeId, work: &mut RootWork) -> Result<Step> {
        work.processed.insert(id);
        self.rendered.insert(id);

        let node = self.tree.node_mut(id)?;
        tracing::trace!(node = %id, kind = node.kind.name(), "begin work");
        let unit = match &node.kind {
            NodeKind::Component(_) => Unit::Component,
            NodeKind::Boundary(_) => Unit::Boundary,
            NodeKind::Text(_) => Unit::Text,
            NodeKind::Host(_) | NodeKind::Fragment | NodeKind::Provider(_) => Unit::Container,
        };

        match unit {
            Unit::Component => self.begin_component(id, work),
            Unit::Boundary => self.begin_boundary(id, work),
            Unit::Text => {
                // A dirty text node has a bound source that changed.
                if node.flags.contains(NodeFlags::DIRTY) {
                    node.flags.insert(NodeFlags::UPDATE);
                }
                node.fresh = false;
                Ok(Step::Child(None))
            }
            Unit::Container => {
                if node.flags.contains(NodeFlags::DIRTY) && node.kind.is_host() {
                    node.flags.insert(NodeFlags::UPDATE);
                }
                if !node.fresh {
                    return Ok(Step::Child(None));
                }
                node.fresh = false;
                let children = std::mem::take(&mut node.children);
                Ok(Step::Child(self.reconcile(id, children, work)?))
            }
        }
    }

    fn begin_component(&mut self, id: NodeId, work: &mut RootWork) -> Result<Step> {
        let node = self.tree.node_mut(id)?;
        let changed = match &node.prev {
            None => true,
            Some(prev) => {
                node.fresh
                    && (!prev.props.shallow_eq(&node.props) || !node.children.is_empty())
            }
        };
        let dirty = node.flags.contains(NodeFlags::DIRTY);
        node.fresh = false;

        if !changed && !dirty {
            node.flags.insert(NodeFlags::MEMOIZED);
            tracing::trace!(node = %id, "props unchanged; bailing out");
            return Ok(Step::Child(None));
        }
        node.flags.remove(NodeFlags::MEMOIZED);
        let component = node.kind.name().to_string();

        match self.render_component(id)? {
            RenderOutcome::Ready(view) => Ok(Step::Child(self.reconcile(id, view, work)?)),
            RenderOutcome::Pending(suspension) => self.unwind(id, Fault::Pending, Some(suspension), work),
            RenderOutcome::Failed(error) if error.is_fatal() => Err(Error::Render {
                node: id,
                component,
                source: error,
            }),
            RenderOutcome::Failed(error) => self.unwind(id, Fault::Error(error), None, work),
            RenderOutcome::Setup(_) => {
                let error = RenderError::new("a render function returned another setup phase");
                self.unwind(id, Fault::Error(error), None, work)
            }
        }
    }

    /// Call the component of `id`, re-running it while it dirties itself.
    fn render_component(&mut self, id: NodeId) -> Result<RenderOutcome> {
        let notify = self.updates.notifier(id);
        let mut attempts = 0;
        self.tree.node_mut(id)?.effects.clear();

        loop {
            let (component, cached, mut hooks) = {
                let node = self.tree.node_mut(id)?;
                let NodeKind::Component(component) = &node.kind else {
                    return Err(Error::UnknownNode(id));
                };
                let component = component.clone();
                node.subs.clear();
                (component, node.render.clone(), std::mem::take(&mut node.hooks))
            };
            let mut effects = Vec::new();
            let mut consumed: SmallVec<[NodeId; 2]> = SmallVec::new();

            let scope = ReactiveContext::enter_render(id, Arc::clone(&notify));
            let (outcome, installed) = {
                let node = self.tree.node(id)?;
                let mut cx = RenderCx::new(
                    node,
                    &self.tree,
                    &self.updates,
                    &mut hooks,
                    &mut effects,
                    &mut consumed,
                );
                render::invoke(&mut cx, &component, cached)
            };
            let tracked = scope.finish();

            let node = self.tree.node_mut(id)?;
            node.hooks = hooks;
            node.subs = tracked.subscriptions;
            // Slot deps are already updated by earlier attempts, so effects
            // queued by them stay pending unless a later attempt replaces them.
            for effect in effects {
                match node.effects.iter_mut().find(|e| e.slot == effect.slot) {
                    Some(pending) => *pending = effect,
                    None => node.effects.push(effect),
                }
            }
            if installed.is_some() {
                node.render = installed;
            }
            for provider in consumed {
                if let Some(provider) = self.tree.get_node_mut(provider) {
                    provider.consumers.insert(id);
                }
            }

            attempts += 1;
            if !tracked.dirtied {
                return Ok(outcome);
            }
            if attempts >= self.config.max_rerenders {
                return Err(Error::TooManyRerenders {
                    node: id,
                    component: component.name().to_string(),
                    limit: self.config.max_rerenders,
                });
            }
            tracing::trace!(node = %id, attempt = attempts, "dirtied while rendering; rendering again");
        }
    }

    fn begin_boundary(&mut self, id: NodeId, work: &mut RootWork) -> Result<Step> {
        let node = self.tree.node_mut(id)?;
        let retry = node.fresh || node.flags.contains(NodeFlags::DIRTY);
        node.fresh = false;
        if !retry {
            return Ok(Step::Child(None));
        }
        if node.fault.take().is_some() {
            tracing::trace!(boundary = %id, "retrying children");
        }
        let children = node.children.clone();
        Ok(Step::Child(self.reconcile(id, children, work)?))
    }

    fn unwind(
        &mut self,
        failed: NodeId,
        fault: Fault,
        suspension: Option<Suspension>,
        work: &mut RootWork,
    ) -> Result<Step> {
        let boundary = self
            .tree
            .ancestors(failed)
            .find(|n| matches!(n.kind, NodeKind::Boundary(_)) && n.fault.is_none())
            .map(Node::id);
        let Some(boundary) = boundary else {
            return self.uncaught(failed, fault, suspension, work);
        };

        match &fault {
            Fault::Error(error) => {
                tracing::debug!(node = %failed, boundary = %boundary, %error, "render error caught");
                let hook = match &self.tree.node(boundary)?.kind {
                    NodeKind::Boundary(b) => b.on_error.clone(),
                    _ => None,
                };
                if let Some(hook) = hook {
                    hook(error);
                }
            }
            Fault::Pending => {
                tracing::debug!(node = %failed, boundary = %boundary, "suspended");
                if let Some(suspension) = suspension {
                    self.suspend(boundary, suspension);
                }
            }
        }

        self.tree.node_mut(boundary)?.fault = Some(fault);
        work.processed.insert(boundary);
        self.rendered.insert(boundary);

        let child = self.show_fallback(boundary, work)?;
        Ok(Step::Unwound { boundary, child })
    }

    fn uncaught(
        &mut self,
        failed: NodeId,
        fault: Fault,
        suspension: Option<Suspension>,
        work: &mut RootWork,
    ) -> Result<Step> {
        match fault {
            Fault::Error(error) => {
                let component = self.tree.node(failed)?.kind.name().to_string();
                tracing::error!(node = %failed, component, %error, "uncaught render error");
                self.uncaught.push(error);
            }
            Fault::Pending => {
                tracing::warn!(node = %failed, "suspended outside any boundary; rendering nothing until it resolves");
                if let Some(suspension) = suspension {
                    self.suspend(failed, suspension);
                }
            }
        }
        Ok(Step::Child(self.reconcile(failed, View::Empty, work)?))
    }

    fn suspend(&mut self, target: NodeId, suspension: Suspension) {
        let updates = self.updates.clone();
        let wait = suspension.into_future();
        self.continuations.push(
            async move {
                wait.await;
                updates.request(target);
            }
            .boxed_local(),
        );
    }

    fn show_fallback(&mut self, boundary: NodeId, work: &mut RootWork) -> Result<Option<NodeId>> {
        let node = self.tree.node(boundary)?;
        let (NodeKind::Boundary(b), Some(fault)) = (&node.kind, &node.fault) else {
            return Ok(None);
        };
        let fallback = Rc::clone(&b.fallback);
        let view = match fault {
            Fault::Error(error) => fallback(Caught::Error(error)),
            Fault::Pending => fallback(Caught::Pending),
        };
        self.reconcile(boundary, view, work)
    }

    fn reconcile(&mut self, parent: NodeId, view: View, work: &mut RootWork) -> Result<Option<NodeId>> {
        let first = Reconciler::new(&mut self.tree, &self.updates, self.config.dev_checks)
            .reconcile_children(parent, view)?;
        let node = self.tree.node_mut(parent)?;
        work.deletions.append(&mut node.deletions);
        Ok(first)
    }
}

impl<H: HostCommit + Default> Default for Scheduler<H> {
    fn default() -> Self {
        Self::new(H::default())
    }
}
