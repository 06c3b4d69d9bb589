//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a value cell with a
//! version counter and a set of subscriber callbacks.
//!
//! # How Signals Work
//!
//! 1. Reading a signal inside a tracking scope (a component render or an
//!    effect) subscribes that scope to the signal.
//!
//! 2. Writing a value equal to the current one is a no-op.
//!
//! 3. Any other write stores the previous value, bumps the version, and
//!    synchronously calls every subscriber with `(value, previous)`.
//!
//! Subscriber callbacks are strong references held by the signal. They are
//! released only through their [`Subscription`] handle.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::context::{Notify, ReactiveContext};
use super::subscriber::{SubscriberId, Subscription};

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
pub(crate) fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Callback<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// A reactive source that scopes can depend on.
pub trait Trackable: Send + Sync {
    /// Stable identity of the source.
    fn source_id(&self) -> u64;

    /// Register `notify` to run after every change.
    fn subscribe_notify(&self, notify: Notify) -> Subscription;
}

struct Cell<T> {
    value: T,
    prev: Option<T>,
    version: u64,
}

struct SignalInner<T> {
    id: u64,
    cell: RwLock<Cell<T>>,
    subscribers: Mutex<Vec<(SubscriberId, Callback<T>)>>,
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same cell.
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert!(count.set(5));
/// assert!(!count.set(5)); // equal write, nobody is notified
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: next_signal_id(),
                cell: RwLock::new(Cell {
                    value,
                    prev: None,
                    version: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of writes that changed the value.
    pub fn version(&self) -> u64 {
        self.inner.cell.read().version
    }

    /// Get the current value, subscribing the active scope.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Borrow the current value, subscribing the active scope.
    ///
    /// `f` sees a copy taken under the lock, so it may write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let value = self.get_untracked();
        f(&value)
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner.cell.read().value.clone()
    }

    /// Value before the last effective write.
    pub fn prev_value(&self) -> Option<T> {
        self.inner.cell.read().prev.clone()
    }

    /// Store `value` and notify subscribers. Returns `false` (and notifies
    /// nobody) if `value` equals the current value.
    pub fn set(&self, value: T) -> bool {
        let (current, prev) = {
            let mut cell = self.inner.cell.write();
            if cell.value == value {
                return false;
            }
            let prev = std::mem::replace(&mut cell.value, value);
            cell.prev = Some(prev.clone());
            cell.version += 1;
            (cell.value.clone(), prev)
        };

        // Callbacks may subscribe or unsubscribe, so run them on a snapshot
        // with no lock held.
        let callbacks: SmallVec<[Callback<T>; 4]> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(&current, &prev);
        }
        true
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.cell.read().value);
        self.set(next)
    }

    /// Register a callback invoked with `(value, previous)` after each
    /// change. The callback stays registered while the returned handle lives.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        let subscriber_id = SubscriberId::new();
        self.inner
            .subscribers
            .lock()
            .push((subscriber_id, Arc::new(callback)));

        let inner = Arc::downgrade(&self.inner);
        Subscription::new(self.inner.id, move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .subscribers
                    .lock()
                    .retain(|(id, _)| *id != subscriber_id);
            }
        })
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    fn track(&self) {
        ReactiveContext::track(self.inner.id, |notify| self.subscribe_notify(notify));
    }
}

impl<T> Trackable for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn source_id(&self) -> u64 {
        self.inner.id
    }

    fn subscribe_notify(&self, notify: Notify) -> Subscription {
        self.subscribe(move |_, _| notify())
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42));
        assert_eq!(signal.get(), 42);
        assert_eq!(signal.prev_value(), Some(0));
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn subscribers_receive_value_and_previous() {
        let signal = Signal::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let _sub = signal.subscribe(move |value, prev| log.lock().push((*value, *prev)));

        signal.set(2);
        signal.set(3);
        assert_eq!(*seen.lock(), vec![(2, 1), (3, 2)]);
    }

    #[test]
    fn equal_writes_do_not_notify() {
        let signal = Signal::new(String::from("a"));
        let call_count = Arc::new(AtomicI32::new(0));

        let count = call_count.clone();
        let _sub = signal.subscribe(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!signal.set("a".to_string()));
        assert!(signal.set("b".to_string()));
        assert!(!signal.set("b".to_string()));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));

        let count = call_count.clone();
        let sub = signal.subscribe(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(signal.subscriber_count(), 1);

        drop(sub);
        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn callbacks_may_unsubscribe_during_notify() {
        let signal = Signal::new(0);
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let held = slot.clone();
        let sub = signal.subscribe(move |_, _| {
            held.lock().take();
        });
        *slot.lock() = Some(sub);

        signal.set(1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn reads_in_a_tracking_scope_subscribe_once() {
        let signal = Signal::new(0);
        let scope = ReactiveContext::enter_effect(Arc::new(|| {}));
        signal.get();
        signal.get();
        signal.with(|v| *v);
        let tracked = scope.finish();

        assert_eq!(tracked.subscriptions.len(), 1);
        assert_eq!(signal.subscriber_count(), 1);

        drop(tracked);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn untracked_reads_do_not_subscribe() {
        let signal = Signal::new(0);
        let scope = ReactiveContext::enter_effect(Arc::new(|| {}));
        signal.get_untracked();
        let tracked = scope.finish();
        assert!(tracked.subscriptions.is_empty());
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn with_allows_writing_the_same_signal() {
        let signal = Signal::new(1);
        let doubled = signal.with(|value| {
            signal.set(value * 2);
            *value
        });
        assert_eq!(doubled, 1);
        assert_eq!(signal.get(), 2);
    }
}
