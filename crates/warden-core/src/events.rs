//! Publish/subscribe delivery of `GovernanceEvent`s.
//!
//! `EventBus` is a callback registry passed to components at construction.
//! Every listener registered at publish time receives every event, in
//! registration order, on the publisher's thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::trace;

use warden_contracts::event::GovernanceEvent;

use crate::traits::EventSink;

/// Handle returned by `EventBus::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&GovernanceEvent) + Send + Sync>;

/// Callback registry that delivers every published event to every listener.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
}

impl EventBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`; keep the id to unsubscribe later.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&GovernanceEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));
        id
    }

    /// Forward every event to another sink.
    pub fn subscribe_sink(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        self.subscribe(move |event| sink.publish(event))
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Number of registered listeners.
    pub fn subscriber_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: &GovernanceEvent) {
        // Snapshot so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        trace!(kind = event.kind(), listeners = listeners.len(), "publishing event");
        for listener in listeners {
            listener(event);
        }
    }
}

/// Stores every published event in memory.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<GovernanceEvent>>,
}

impl CollectingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far, in publish order.
    pub fn events(&self) -> Vec<GovernanceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events whose `kind()` equals `kind`.
    pub fn of_kind(&self, kind: &str) -> Vec<GovernanceEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    /// Forget every received event.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: &GovernanceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: &GovernanceEvent) {}
}
