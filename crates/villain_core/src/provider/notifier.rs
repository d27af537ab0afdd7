//! Process-local change notification keyed by locator.
//!
//! # Responsibility
//! - Track observers registered on locators.
//! - Deliver payload-free invalidation signals to related observers.
//!
//! # Invariants
//! - A publish reaches every observer registered on the same locator, on an
//!   ancestor of it, or on a descendant of it.
//! - A publish that happens after `subscribe` returns is delivered to it.
//! - Callbacks run with no notifier lock held, so they may re-enter the
//!   notifier or the provider.

use super::uri::Locator;
use log::debug;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observer callback invoked with the locator that was published.
pub type ChangeCallback = Arc<dyn Fn(&Locator) + Send + Sync>;

/// Opaque subscription id returned by `ChangeNotifier::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    locator: Locator,
    callback: ChangeCallback,
}

/// Pub/sub hub shared by the provider and its observers.
#[derive(Default)]
pub struct ChangeNotifier {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<u64, Subscriber>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for changes related to `locator`.
    pub fn subscribe<F>(&self, locator: Locator, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Locator) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("event=observer_subscribe module=notifier status=ok handle={id} locator={locator}");
        self.lock().insert(
            id,
            Subscriber {
                locator,
                callback: Arc::new(callback),
            },
        );
        SubscriptionHandle(id)
    }

    /// Removes a subscription. Returns `false` when the handle was unknown.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let removed = self.lock().remove(&handle.0).is_some();
        debug!(
            "event=observer_unsubscribe module=notifier status=ok handle={} removed={removed}",
            handle.0
        );
        removed
    }

    /// Signals a change at `locator`; returns the number of callbacks invoked.
    pub fn publish(&self, locator: &Locator) -> usize {
        let callbacks: Vec<ChangeCallback> = self
            .lock()
            .values()
            .filter(|subscriber| subscriber.locator.is_related_to(locator))
            .map(|subscriber| Arc::clone(&subscriber.callback))
            .collect();

        for callback in &callbacks {
            callback(locator);
        }

        debug!(
            "event=change_publish module=notifier status=ok locator={locator} delivered={}",
            callbacks.len()
        );
        callbacks.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Subscriber>> {
        // The map holds no cross-entry invariant a panicking callback could break.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
