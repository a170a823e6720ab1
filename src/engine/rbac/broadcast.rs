//! Change Broadcaster
//!
//! In-process publish/subscribe for "permissions updated" signals.
//! Dispatch is synchronous, once per publish, in subscription order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Emitted after a successful write of the permission matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChanged {
    /// Service instance that performed the write
    pub origin: Uuid,
    pub changed_at: DateTime<Utc>,
}

impl PolicyChanged {
    pub fn new(origin: Uuid) -> Self {
        Self {
            origin,
            changed_at: Utc::now(),
        }
    }
}

type Handler = Arc<dyn Fn(&PolicyChanged) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Shared channel; clones publish to and subscribe on the same registry
#[derive(Clone, Default)]
pub struct ChangeBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered until the returned
    /// subscription is dropped or `unsubscribe` is called.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PolicyChanged) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every current subscriber. Handlers added during
    /// dispatch wait for the next publish; handlers removed during dispatch
    /// are not called.
    pub fn publish(&self, event: PolicyChanged) {
        // Snapshot so handlers can (un)subscribe while we dispatch
        let handlers: Vec<(u64, Handler)> = {
            let registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            registry
                .handlers
                .iter()
                .map(|(id, h)| (*id, Arc::clone(h)))
                .collect()
        };

        tracing::debug!(
            origin = %event.origin,
            subscribers = handlers.len(),
            "broadcasting permission change"
        );

        for (id, handler) in handlers {
            if self.is_registered(id) {
                handler(&event);
            }
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        self.registry
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .handlers
            .iter()
            .any(|(registered, _)| *registered == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .handlers
            .len()
    }
}

/// Handle returned by `subscribe`; unsubscribes on drop
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|p| p.into_inner());
            registry.handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_in_subscription_order() {
        let broadcaster = ChangeBroadcaster::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            broadcaster.subscribe(move |_| seen.lock().unwrap().push("first"))
        };
        let second = {
            let seen = Arc::clone(&seen);
            broadcaster.subscribe(move |_| seen.lock().unwrap().push("second"))
        };

        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);

        drop(first);
        drop(second);
    }

    #[test]
    fn test_fires_once_per_publish() {
        let broadcaster = ChangeBroadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let count = Arc::clone(&count);
            broadcaster.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = ChangeBroadcaster::new();
        let count = Arc::new(AtomicUsize::new(0));
        let sub = {
            let count = Arc::clone(&count);
            broadcaster.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(broadcaster.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(broadcaster.subscriber_count(), 0);

        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_during_dispatch() {
        let broadcaster = ChangeBroadcaster::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let sub = {
            let slot = Arc::clone(&slot);
            broadcaster.subscribe(move |_| {
                slot.lock().unwrap().take();
            })
        };
        *slot.lock().unwrap() = Some(sub);

        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_handler_removed_mid_dispatch_is_skipped() {
        let broadcaster = ChangeBroadcaster::new();
        let later_calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let _first = {
            let slot = Arc::clone(&slot);
            broadcaster.subscribe(move |_| {
                slot.lock().unwrap().take();
            })
        };
        let second = {
            let later_calls = Arc::clone(&later_calls);
            broadcaster.subscribe(move |_| {
                later_calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        *slot.lock().unwrap() = Some(second);

        broadcaster.publish(PolicyChanged::new(Uuid::new_v4()));
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }
}
