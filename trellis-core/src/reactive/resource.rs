//! Async Resources
//!
//! A [`Resource`] tracks one asynchronous load at a time. Its [`LoadState`]
//! lives in a signal, so a component reading the state re-renders when the
//! load finishes. Starting a new load aborts the previous one; an aborted load
//! never writes its result.
//!
//! A component that cannot render until the load finishes returns the
//! [`Suspension`] from [`Resource::load`] or [`Resource::settled`]. The
//! resource must be owned above the catching boundary: the subtree below the
//! boundary is replaced by the fallback while it waits.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::{AbortHandle, Abortable, FutureExt, LocalBoxFuture, Shared};

use super::signal::Signal;
use crate::error::RenderError;
use crate::render::Suspension;

/// Progress of a resource's current load.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(T),
    Failed(RenderError),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            LoadState::Ready(value) => Some(value),
            _ => None,
        }
    }
}

/// Handed to a fetch so it can notice it was superseded.
#[derive(Clone)]
pub struct AbortSignal {
    handle: AbortHandle,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.handle.is_aborted()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
    done: Shared<LocalBoxFuture<'static, ()>>,
}

#[derive(Default)]
struct Loads {
    generation: u64,
    current: Option<InFlight>,
}

/// A value produced by an asynchronous fetch.
///
/// ```rust
/// use trellis_core::reactive::{LoadState, Resource};
///
/// let user = Resource::<String>::new();
/// let wait = user.load(|_abort| async { Ok("ada".to_string()) });
/// assert!(user.state().is_loading());
///
/// futures_util::FutureExt::now_or_never(wait.into_future());
/// assert_eq!(user.state(), LoadState::Ready("ada".to_string()));
/// ```
pub struct Resource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    state: Signal<LoadState<T>>,
    loads: Rc<RefCell<Loads>>,
}

impl<T> Resource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Signal::new(LoadState::Idle),
            loads: Rc::new(RefCell::new(Loads::default())),
        }
    }

    /// Current state, subscribing the active scope.
    pub fn state(&self) -> LoadState<T> {
        self.state.get()
    }

    /// The signal the state is published on.
    pub fn signal(&self) -> &Signal<LoadState<T>> {
        &self.state
    }

    /// Start a load, aborting any load still in flight.
    ///
    /// `fetch` is called immediately; the returned future only runs while the
    /// returned [`Suspension`] (or another waiter) is polled.
    pub fn load<F, Fut>(&self, fetch: F) -> Suspension
    where
        F: FnOnce(AbortSignal) -> Fut,
        Fut: Future<Output = Result<T, RenderError>> + 'static,
    {
        let generation = {
            let mut loads = self.loads.borrow_mut();
            if let Some(stale) = loads.current.take() {
                tracing::debug!(generation = stale.generation, "aborting stale load");
                stale.abort.abort();
            }
            loads.generation += 1;
            loads.generation
        };

        let (abort, registration) = AbortHandle::new_pair();
        let task = Abortable::new(
            fetch(AbortSignal {
                handle: abort.clone(),
            }),
            registration,
        );

        let state = self.state.clone();
        let done = async move {
            match task.await {
                Ok(Ok(value)) => {
                    state.set(LoadState::Ready(value));
                }
                Ok(Err(error)) => {
                    state.set(LoadState::Failed(error));
                }
                Err(_aborted) => {}
            }
        }
        .boxed_local()
        .shared();

        self.loads.borrow_mut().current = Some(InFlight {
            generation,
            abort,
            done: done.clone(),
        });
        self.state.set(LoadState::Loading);

        Suspension::new(done)
    }

    /// Wait for the current load. Resolves at once when nothing is in flight.
    pub fn settled(&self) -> Suspension {
        match &self.loads.borrow().current {
            Some(inflight) => Suspension::new(inflight.done.clone()),
            None => Suspension::ready(),
        }
    }

    /// Abort the load in flight, leaving the state untouched.
    pub fn abort(&self) {
        if let Some(inflight) = self.loads.borrow_mut().current.take() {
            inflight.abort.abort();
        }
    }
}

impl<T> Default for Resource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Resource<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            loads: Rc::clone(&self.loads),
        }
    }
}

impl<T> fmt::Debug for Resource<T>
where
    T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("state", &self.state.get_untracked())
            .field("generation", &self.loads.borrow().generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[test]
    fn ready_result_is_published() {
        let resource = Resource::<i32>::new();
        assert_eq!(resource.state(), LoadState::Idle);

        let wait = resource.load(|_| async { Ok(7) });
        assert_eq!(resource.state(), LoadState::Loading);

        assert!(wait.into_future().now_or_never().is_some());
        assert_eq!(resource.state(), LoadState::Ready(7));
    }

    #[test]
    fn failures_are_published() {
        let resource = Resource::<i32>::new();
        let wait = resource.load(|_| async { Err(RenderError::new("offline")) });
        wait.into_future().now_or_never();
        assert_eq!(
            resource.state(),
            LoadState::Failed(RenderError::new("offline"))
        );
    }

    #[test]
    fn a_new_load_aborts_the_previous_one() {
        let resource = Resource::<&'static str>::new();
        let (first_tx, first_rx) = oneshot::channel::<&'static str>();
        let (second_tx, second_rx) = oneshot::channel::<&'static str>();

        let mut first_abort = None;
        let first = resource.load(|abort| {
            first_abort = Some(abort);
            async move { first_rx.await.map_err(|_| RenderError::new("dropped")) }
        });
        let second = resource.load(|_| async move {
            second_rx.await.map_err(|_| RenderError::new("dropped"))
        });

        assert!(first_abort.is_some_and(|a| a.is_aborted()));

        let _ = first_tx.send("stale");
        assert!(first.into_future().now_or_never().is_some());
        assert_eq!(resource.state(), LoadState::Loading);

        let _ = second_tx.send("fresh");
        assert!(second.into_future().now_or_never().is_some());
        assert_eq!(resource.state(), LoadState::Ready("fresh"));
    }

    #[test]
    fn settled_waits_for_the_current_load() {
        let resource = Resource::<i32>::new();
        assert!(resource.settled().into_future().now_or_never().is_some());

        let (tx, rx) = oneshot::channel::<i32>();
        let _wait = resource.load(|_| async move { rx.await.map_err(|_| RenderError::new("dropped")) });

        let mut settled = resource.settled().into_future();
        assert!((&mut settled).now_or_never().is_none());

        let _ = tx.send(3);
        assert!(settled.now_or_never().is_some());
        assert_eq!(resource.state(), LoadState::Ready(3));
    }
}
