//! Memo Implementation
//!
//! A Memo is a derived value: a pure computation over other reactive values
//! whose result is itself readable as a reactive source.
//!
//! # How Memos Work
//!
//! The memo owns an inner [`Signal`] and an [`Effect`]. The effect re-runs
//! the computation when any input changes and writes the result into the
//! signal. Because signal writes compare values, readers of the memo are
//! only notified when the derived result actually changes.

use std::fmt::{self, Debug};
use std::sync::Arc;

use super::context::{Notify, ReactiveContext};
use super::effect::Effect;
use super::signal::{Signal, Trackable};
use super::subscriber::Subscription;

/// A derived reactive value.
///
/// ```rust
/// use trellis_core::reactive::{Memo, Signal};
///
/// let count = Signal::new(3);
/// let c = count.clone();
/// let parity = Memo::new(move || c.get() % 2);
///
/// assert_eq!(parity.get(), 1);
/// count.set(5); // still odd: readers of `parity` are not notified
/// assert_eq!(parity.version(), 0);
/// ```
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    value: Signal<T>,
    effect: Effect,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a memo. The computation must be pure: it runs once untracked
    /// to seed the value, then under its own effect.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let compute = Arc::new(compute);
        let value = Signal::new(ReactiveContext::untracked(|| compute()));

        let target = value.clone();
        let effect = Effect::new(move || {
            target.set(compute());
            None
        });

        Self { value, effect }
    }

    /// Get the current value, subscribing the active scope.
    pub fn get(&self) -> T {
        self.value.get()
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.value.get_untracked()
    }

    /// Number of times the derived result changed.
    pub fn version(&self) -> u64 {
        self.value.version()
    }

    /// The signal the result is published on.
    pub fn signal(&self) -> &Signal<T> {
        &self.value
    }

    pub(crate) fn effect(&self) -> &Effect {
        &self.effect
    }

    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.effect.dispose();
    }
}

impl<T> Trackable for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn source_id(&self) -> u64 {
        self.value.id()
    }

    fn subscribe_notify(&self, notify: Notify) -> Subscription {
        self.value.subscribe_notify(notify)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &self.get_untracked())
            .field("version", &self.version())
            .field("effect", &self.effect)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn memo_follows_its_inputs() {
        let base = Signal::new(5);
        let b = base.clone();
        let doubled = Memo::new(move || b.get() * 2);
        assert_eq!(doubled.get(), 10);

        base.set(10);
        assert_eq!(doubled.get(), 20);
    }

    #[test]
    fn memo_chains_through_other_memos() {
        let base = Signal::new(5);
        let b = base.clone();
        let doubled = Memo::new(move || b.get() * 2);
        let d = doubled.clone();
        let plus_ten = Memo::new(move || d.get() + 10);

        assert_eq!(plus_ten.get(), 20);
        base.set(10);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn equal_results_do_not_notify_readers() {
        let base = Signal::new(1);
        let b = base.clone();
        let parity = Memo::new(move || b.get() % 2);

        let notified = Arc::new(AtomicI32::new(0));
        let n = notified.clone();
        let _sub = parity.signal().subscribe(move |_, _| {
            n.fetch_add(1, Ordering::SeqCst);
        });

        base.set(3);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
        base.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disposed_memo_keeps_last_value() {
        let base = Signal::new(1);
        let b = base.clone();
        let memo = Memo::new(move || b.get());
        memo.dispose();

        base.set(2);
        assert_eq!(memo.get(), 1);
        assert_eq!(base.subscriber_count(), 0);
    }
}
