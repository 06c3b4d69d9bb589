//! Subscriber identities and subscription handles.
//!
//! Every callback registered on a signal gets a [`SubscriberId`]. The
//! registration is owned by a [`Subscription`]: dropping or cancelling it
//! removes the callback from the publisher. Nodes and effects keep the
//! subscriptions made during their last run and drop them before the next
//! one, which is how stale dependencies are pruned.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Teardown run when a subscription ends.
type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// An active registration on a reactive source.
///
/// The callback stays registered for as long as this handle lives.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    source: u64,
    cancel: Option<Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new<F>(source: u64, cancel: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            source,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// ID of the signal this subscription is registered on.
    pub fn source(&self) -> u64 {
        self.source
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the callback registered for the lifetime of the source.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("source", &self.source)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn drop_and_cancel_run_teardown_once() {
        let count = Arc::new(AtomicI32::new(0));

        let c = count.clone();
        let sub = Subscription::new(1, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = count.clone();
        let sub = Subscription::new(1, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detached_subscription_never_tears_down() {
        let count = Arc::new(AtomicI32::new(0));
        let c = count.clone();
        Subscription::new(7, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .detach();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
