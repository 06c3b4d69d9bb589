//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever one of
//! its dependencies changes.
//!
//! # How Effects Work
//!
//! 1. On creation the effect runs once, synchronously, and records every
//!    signal it read (or subscribes to an explicit dependency list).
//!
//! 2. When a dependency is written, the previous cleanup runs, the old
//!    subscriptions are dropped, and the function runs again. Dependencies
//!    are rebuilt from scratch on every run.
//!
//! 3. A write to a dependency while the effect is already running queues a
//!    single follow-up run instead of recursing.
//!
//! # Cleanup
//!
//! The effect function may return a cleanup closure. It runs before the next
//! run and when the effect is disposed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::{Notify, ReactiveContext};
use super::signal::Trackable;
use super::subscriber::Subscription;

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Follow-up runs an effect may trigger on itself before it gives up.
const MAX_CHAINED_RUNS: usize = 100;

/// Teardown returned by an effect run.
pub type Cleanup = Box<dyn FnOnce() + Send>;

type EffectFn = Box<dyn FnMut() -> Option<Cleanup> + Send>;

struct EffectState {
    run: Option<EffectFn>,
    deps: Option<Vec<Arc<dyn Trackable>>>,
    subscriptions: SmallVec<[Subscription; 4]>,
    cleanup: Option<Cleanup>,
    disposed: bool,
    running: bool,
    rerun: bool,
    run_count: usize,
}

struct EffectInner {
    id: u64,
    state: Mutex<EffectState>,
}

/// A side-effecting computation that runs when dependencies change.
///
/// Clones share the same effect. The effect stays alive while its sources
/// hold its subscriptions, so it must be [disposed](Effect::dispose) to stop.
///
/// ```rust
/// use trellis_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Signal::new(-1);
///
/// let (c, s) = (count.clone(), seen.clone());
/// let effect = Effect::new(move || {
///     s.set(c.get());
///     None
/// });
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect that tracks every signal it reads, and run it once.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut() -> Option<Cleanup> + Send + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create an effect that depends only on `deps`, and run it once.
    ///
    /// Reads inside `run` are untracked.
    pub fn with_deps<F>(deps: Vec<Arc<dyn Trackable>>, run: F) -> Self
    where
        F: FnMut() -> Option<Cleanup> + Send + 'static,
    {
        let effect = Self::build(Some(deps), Box::new(run));
        effect.execute();
        effect
    }

    /// Create an effect without running it.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut() -> Option<Cleanup> + Send + 'static,
    {
        Self::build(None, Box::new(run))
    }

    fn build(deps: Option<Vec<Arc<dyn Trackable>>>, run: EffectFn) -> Self {
        Self {
            inner: Arc::new(EffectInner {
                id: EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(EffectState {
                    run: Some(run),
                    deps,
                    subscriptions: SmallVec::new(),
                    cleanup: None,
                    disposed: false,
                    running: false,
                    rerun: false,
                    run_count: 0,
                }),
            }),
        }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Run the effect now.
    pub fn execute(&self) {
        execute(&self.inner);
    }

    /// Stop the effect: drop its subscriptions and run the last cleanup.
    pub fn dispose(&self) {
        let (subscriptions, cleanup) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (
                std::mem::take(&mut state.subscriptions),
                state.cleanup.take(),
            )
        };

        drop(subscriptions);
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.state.lock().run_count
    }

    /// Get the number of dependencies of the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }
}

fn execute(inner: &Arc<EffectInner>) {
    let mut runs = 0;

    loop {
        let (mut run, cleanup, stale, deps) = {
            let mut state = inner.state.lock();
            if state.disposed {
                return;
            }
            if state.running {
                state.rerun = true;
                return;
            }
            let Some(run) = state.run.take() else {
                return;
            };
            state.running = true;
            (
                run,
                state.cleanup.take(),
                std::mem::take(&mut state.subscriptions),
                state.deps.clone(),
            )
        };

        drop(stale);
        if let Some(cleanup) = cleanup {
            cleanup();
        }

        let notify = notifier(Arc::downgrade(inner));
        let (next_cleanup, subscriptions) = match deps {
            Some(deps) => {
                let cleanup = ReactiveContext::untracked(&mut run);
                let subscriptions = deps
                    .iter()
                    .map(|dep| dep.subscribe_notify(Arc::clone(&notify)))
                    .collect();
                (cleanup, subscriptions)
            }
            None => {
                let scope = ReactiveContext::enter_effect(notify);
                let cleanup = run();
                (cleanup, scope.finish().subscriptions)
            }
        };

        let again = {
            let mut state = inner.state.lock();
            state.run = Some(run);
            state.running = false;
            state.run_count += 1;

            if state.disposed {
                // Disposed while running: nothing may outlive this run.
                drop(state);
                drop(subscriptions);
                if let Some(cleanup) = next_cleanup {
                    cleanup();
                }
                return;
            }

            state.cleanup = next_cleanup;
            state.subscriptions = subscriptions;
            std::mem::take(&mut state.rerun)
        };

        if !again {
            return;
        }
        runs += 1;
        if runs >= MAX_CHAINED_RUNS {
            tracing::error!(
                effect = inner.id,
                runs,
                "effect keeps invalidating itself; dropping further runs"
            );
            return;
        }
    }
}

fn notifier(inner: Weak<EffectInner>) -> Notify {
    Arc::new(move || {
        if let Some(inner) = inner.upgrade() {
            execute(&inner);
        }
    })
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &state.run_count)
            .field("dependency_count", &state.subscriptions.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
