//! Ambient event broadcast to independent observers.
//!
//! Observers register interest in named events and get notified about
//! passively observed traffic (public messages, URLs, channel joins). An
//! observer failure never affects the other observers or the broadcaster's
//! caller.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::source::Conversation;

/// The session joined a channel.
pub const JOINED_CHANNEL: &str = "joinedChannel";
/// An undirected public message was seen.
pub const PUBLIC_MESSAGE_RECEIVED: &str = "publicMessageReceived";
/// A URL appeared in an undirected public message; one event per URL.
pub const PUBLIC_URL_RECEIVED: &str = "publicURLReceived";

/// A broadcast ambient event.
#[derive(Clone, Debug)]
pub struct AmbientEvent {
    /// Event name (one of the constants above).
    pub name: String,
    /// The conversation the event originated from.
    pub conversation: Conversation,
    /// Event payload: the message text, the URL, ...
    pub args: Vec<String>,
}

/// An observer of ambient events.
#[async_trait]
pub trait AmbientObserver: Send + Sync {
    /// Whether this observer wants the named event.
    fn interested_in(&self, event_name: &str) -> bool;

    /// Handle one event. Errors are logged by the broadcaster and isolated
    /// from other observers.
    async fn notify(&self, event: &AmbientEvent) -> anyhow::Result<()>;
}

/// Registry of ambient observers.
///
/// `snapshot` returns the observers interested in an event, in a stable
/// insertion order, decoupled from concurrent registry mutation.
pub trait ObserverRegistry: Send + Sync {
    /// Add an observer at the end of the delivery order.
    fn register(&self, observer: Arc<dyn AmbientObserver>);

    /// Remove a previously registered observer.
    fn unregister(&self, observer: &Arc<dyn AmbientObserver>);

    /// The observers interested in `event_name`, in insertion order.
    fn snapshot(&self, event_name: &str) -> Vec<Arc<dyn AmbientObserver>>;
}

/// In-memory, insertion-ordered observer registry.
#[derive(Default)]
pub struct StaticObserverRegistry {
    observers: RwLock<Vec<Arc<dyn AmbientObserver>>>,
}

impl StaticObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> StaticObserverRegistry {
        StaticObserverRegistry::default()
    }
}

impl ObserverRegistry for StaticObserverRegistry {
    fn register(&self, observer: Arc<dyn AmbientObserver>) {
        self.observers.write().push(observer);
    }

    fn unregister(&self, observer: &Arc<dyn AmbientObserver>) {
        self.observers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    fn snapshot(&self, event_name: &str) -> Vec<Arc<dyn AmbientObserver>> {
        self.observers
            .read()
            .iter()
            .filter(|o| o.interested_in(event_name))
            .cloned()
            .collect()
    }
}

/// Fans out named events to every interested observer.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<dyn ObserverRegistry>,
}

impl EventBroadcaster {
    /// Create a broadcaster over an observer registry.
    pub fn new(registry: Arc<dyn ObserverRegistry>) -> EventBroadcaster {
        EventBroadcaster { registry }
    }

    /// Deliver an event to the current snapshot of interested observers.
    ///
    /// Delivery is sequential in registry order. A failing observer is
    /// logged and skipped; failures never propagate to the caller and
    /// undelivered events are not retried or persisted.
    pub async fn broadcast(&self, name: &str, conversation: Conversation, args: Vec<String>) {
        let snapshot = self.registry.snapshot(name);
        if snapshot.is_empty() {
            return;
        }
        crate::metrics::broadcasts().inc();
        let event = AmbientEvent {
            name: name.to_string(),
            conversation,
            args,
        };
        for observer in snapshot {
            if let Err(e) = observer.notify(&event).await {
                tracing::warn!(event = %event.name, error = %e, "ambient observer failed");
            }
        }
    }
}
