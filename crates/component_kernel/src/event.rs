//! Synchronous publish/subscribe event bus
//!
//! Subscribers are grouped by event name and invoked in subscription order.
//! Every callback runs isolated: an error or a panic in one callback is logged
//! and counted, and delivery continues with the next subscriber. `publish`
//! never fails and never suspends.

use crate::error::EventError;
use crate::utils::panic_message;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, trace};

/// Trait binding a payload type to the event name it is published under
pub trait KernelEvent: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Returns the event name used for routing
    fn event_name() -> &'static str
    where
        Self: Sized;
}

type Callback = Arc<dyn Fn(&Value) -> Result<(), EventError> + Send + Sync>;

struct Subscriber {
    id: u64,
    active: AtomicBool,
    callback: Callback,
}

/// Subscriber lists keyed by event name
#[derive(Default)]
struct SubscriberTable {
    subscribers: DashMap<String, SmallVec<[Arc<Subscriber>; 4]>>,
}

impl SubscriberTable {
    fn remove(&self, event_name: &str, id: u64) -> bool {
        let mut removed = false;
        if let Some(mut list) = self.subscribers.get_mut(event_name) {
            list.retain(|sub| {
                if sub.id == id {
                    sub.active.store(false, Ordering::Release);
                    removed = true;
                    false
                } else {
                    true
                }
            });
        }
        // Drop empty lists so `event_names` only reports live names
        self.subscribers.remove_if(event_name, |_, list| list.is_empty());
        removed
    }
}

/// Handle returned by [`EventBus::subscribe`]
///
/// Dropping the handle does NOT remove the subscription; call
/// [`Subscription::unsubscribe`] for that.
#[must_use = "dropping a Subscription keeps the callback registered; store it to unsubscribe later"]
pub struct Subscription {
    event_name: String,
    id: u64,
    table: Weak<SubscriberTable>,
    active: AtomicBool,
}

impl Subscription {
    /// Remove exactly this subscription. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        match self.table.upgrade() {
            Some(table) => table.remove(&self.event_name, self.id),
            None => false,
        }
    }

    /// Whether `unsubscribe` has not been called yet
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Event name this subscription listens to
    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_name", &self.event_name)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Statistics for event bus monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub events_published: u64,
    pub callbacks_invoked: u64,
    pub callback_failures: u64,
    pub active_subscriptions: usize,
}

/// Process-wide publish/subscribe hub
pub struct EventBus {
    table: Arc<SubscriberTable>,
    next_id: AtomicU64,
    events_published: AtomicU64,
    callbacks_invoked: AtomicU64,
    callback_failures: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            table: Arc::new(SubscriberTable::default()),
            next_id: AtomicU64::new(1),
            events_published: AtomicU64::new(0),
            callbacks_invoked: AtomicU64::new(0),
            callback_failures: AtomicU64::new(0),
        }
    }

    /// Register `callback` for `event_name`
    pub fn subscribe<F>(&self, event_name: &str, callback: F) -> Subscription
    where
        F: Fn(&Value) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber {
            id,
            active: AtomicBool::new(true),
            callback: Arc::new(callback),
        });

        self.table
            .subscribers
            .entry(event_name.to_string())
            .or_default()
            .push(subscriber);

        debug!("📝 Subscribed #{} to {}", id, event_name);

        Subscription {
            event_name: event_name.to_string(),
            id,
            table: Arc::downgrade(&self.table),
            active: AtomicBool::new(true),
        }
    }

    /// Register a typed callback; the payload is deserialized into `T`
    pub fn on<T, F>(&self, callback: F) -> Subscription
    where
        T: KernelEvent,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.subscribe(T::event_name(), move |payload: &Value| {
            let event = T::deserialize(payload)
                .map_err(|e| EventError::DeserializationFailed(e.to_string()))?;
            callback(event)
        })
    }

    /// Deliver `payload` to every subscriber of `event_name`, in order
    pub fn publish(&self, event_name: &str, payload: &Value) {
        self.events_published.fetch_add(1, Ordering::Relaxed);

        // Snapshot so callbacks can (un)subscribe without holding the shard lock
        let snapshot = match self.table.subscribers.get(event_name) {
            Some(entry) => entry.value().clone(),
            None => {
                trace!("No subscribers for event: {}", event_name);
                return;
            }
        };

        trace!("📤 Publishing {} to {} subscribers", event_name, snapshot.len());

        for subscriber in snapshot.iter() {
            if !subscriber.active.load(Ordering::Acquire) {
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(payload)));
            self.callbacks_invoked.fetch_add(1, Ordering::Relaxed);

            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(panic_info) => Some(EventError::HandlerFailed(format!(
                    "subscriber panicked: {}",
                    panic_message(panic_info.as_ref())
                ))),
            };

            if let Some(e) = failure {
                self.callback_failures.fetch_add(1, Ordering::Relaxed);
                error!("❌ Subscriber #{} for {} failed: {}", subscriber.id, event_name, e);
            }
        }
    }

    /// Serialize a typed event and publish it under its own name
    pub fn emit<T: KernelEvent>(&self, event: &T) -> Result<(), EventError> {
        let payload = serde_json::to_value(event)?;
        self.publish(T::event_name(), &payload);
        Ok(())
    }

    /// Number of live subscribers for `event_name`
    pub fn subscriber_count(&self, event_name: &str) -> usize {
        self.table
            .subscribers
            .get(event_name)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// All event names that currently have subscribers
    pub fn event_names(&self) -> Vec<String> {
        self.table
            .subscribers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Get current statistics
    pub fn stats(&self) -> EventStats {
        EventStats {
            events_published: self.events_published.load(Ordering::Relaxed),
            callbacks_invoked: self.callbacks_invoked.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
            active_subscriptions: self.table.subscribers.iter().map(|e| e.len()).sum(),
        }
    }
}
