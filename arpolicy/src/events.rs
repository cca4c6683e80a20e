//! Synchronous publish/subscribe registry.
//!
//! Used for tier-change and session-transition notifications. Listeners are
//! invoked on the publishing thread, in registration order, outside of any
//! lock held by the registry, so a listener may itself subscribe or
//! unsubscribe.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Subscribers::subscribe`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered set of registered listeners for events of type `E`.
pub struct Subscribers<E> {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionId, Listener<E>)>>,
}

impl<E> Subscribers<E> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. It stays registered until [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Invoke every listener with `event`.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Subscribers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_in_registration_order() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            subscribers.subscribe(move |value: &u32| seen.lock().push((tag, *value)));
        }

        subscribers.publish(&7);
        assert_eq!(
            *seen.lock(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let subscribers: Subscribers<u32> = Subscribers::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = Arc::clone(&count);
        let id = subscribers.subscribe(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });

        subscribers.publish(&1);
        assert!(subscribers.unsubscribe(id));
        subscribers.publish(&2);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert!(!subscribers.unsubscribe(id));
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let subscribers: Arc<Subscribers<u32>> = Arc::new(Subscribers::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let subs = Arc::clone(&subscribers);
        let s = Arc::clone(&slot);
        let id = subscribers.subscribe(move |_| {
            if let Some(id) = *s.lock() {
                subs.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        subscribers.publish(&1);
        assert!(subscribers.is_empty());
    }
}
