//! Main EventBus struct tying all components together.

use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::receivers::{CallbackReceiver, EventTarget, ReceiverRef};
use crate::registry::{StickyStore, SubscriptionRegistry};
use crate::types::{BusStats, EventData, EventName, Payload, ReceiverKey, TargetKey};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info};

/// Bus configuration.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Name of the dispatch thread.
    pub thread_name: String,

    /// Maximum number of queued publishes (None = unbounded).
    /// Publishes past the limit are dropped and logged. Sticky replays are
    /// always queued.
    pub queue_capacity: Option<usize>,

    /// Treat a panicking receiver as a fault instead of taking down the
    /// dispatch thread.
    pub catch_panics: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            thread_name: "herald-dispatch".to_string(),
            queue_capacity: None,
            catch_panics: true,
        }
    }
}

struct Inner {
    registry: Arc<SubscriptionRegistry>,
    sticky: StickyStore,
    dispatcher: Dispatcher,
}

impl Inner {
    fn register(&self, key: ReceiverKey, receiver: ReceiverRef, names: &[&str]) -> usize {
        let added = self.registry.register(key, &receiver, names, |slot| match slot {
            None => {
                for (name, data) in self.sticky.entries() {
                    self.replay(&name, data, key, &receiver);
                }
            }
            Some(name) => {
                if let Some(data) = self.sticky.get(name) {
                    self.replay(name, data, key, &receiver);
                }
            }
        });
        debug!(
            receiver = %receiver.label(),
            names = ?names,
            added,
            "Registered receiver"
        );
        added
    }

    fn replay(&self, name: &str, data: Arc<EventData>, key: ReceiverKey, receiver: &ReceiverRef) {
        debug!(event = name, receiver = %receiver.label(), "Replaying sticky event");
        self.dispatcher.replay(name, data, key, Arc::clone(receiver));
    }

    fn publish(&self, name: &str, data: Arc<EventData>) {
        let audience = self.registry.audience(name);
        info!(
            event = name,
            shape = data.shape(),
            values = data.arity(),
            audience = audience.len(),
            "Publishing event"
        );
        self.dispatcher.publish(name, data, audience);
    }
}

/// In-process publish/subscribe event bus.
///
/// Provides:
/// - Registration of receivers by event name, or for every event
/// - Sticky events replayed to receivers that register later
/// - Weakly held callback targets that evict themselves once dropped
/// - Delivery serialized on one dispatch thread, whatever thread published
///
/// Cloning is cheap and every clone talks to the same bus. The dispatch
/// thread is stopped once the last clone is dropped. A receiver that holds a
/// clone of the bus it is registered on keeps the bus alive until it is
/// unregistered.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Create a bus with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus and spawn its dispatch thread.
    pub fn with_config(config: BusConfig) -> Result<Self> {
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Dispatcher::spawn(&config, Arc::clone(&registry))?;
        debug!(thread = %config.thread_name, "Event bus started");

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                sticky: StickyStore::new(),
                dispatcher,
            }),
        })
    }

    /// The process-wide bus, created on first use.
    ///
    /// # Panics
    ///
    /// Panics if its dispatch thread cannot be spawned.
    pub fn global() -> &'static EventBus {
        static GLOBAL: OnceLock<EventBus> = OnceLock::new();
        GLOBAL.get_or_init(|| EventBus::new().expect("failed to spawn the global event bus"))
    }

    // --- Registration ---

    /// Register a receiver for `names`, or for every event when `names` is
    /// empty.
    ///
    /// The current sticky payload of each requested name (every sticky
    /// payload, for a catch-all registration) is queued to the receiver
    /// before it can see any later publish of that name. Registering the same
    /// receiver for the same name twice has no effect. Returns the number of
    /// new registrations.
    pub fn register(&self, receiver: ReceiverRef, names: &[&str]) -> usize {
        self.inner.register(ReceiverKey::of(&receiver), receiver, names)
    }

    /// Remove a receiver from every event it was registered for.
    /// Returns false if it was not registered.
    pub fn unregister(&self, receiver: &ReceiverRef) -> bool {
        let removed = self.inner.registry.remove(&ReceiverKey::of(receiver));
        if removed > 0 {
            debug!(receiver = %receiver.label(), removed, "Unregistered receiver");
        }
        removed > 0
    }

    /// Register every callback `target` declares.
    ///
    /// The bus only keeps weak references to `target`. Registering the same
    /// target again is idempotent. Returns the number of new registrations.
    pub fn register_target<T: EventTarget>(&self, target: &Arc<T>) -> usize {
        let target_key = TargetKey::of(target);
        target
            .event_callbacks()
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let receiver: ReceiverRef = Arc::new(
                    CallbackReceiver::new(target, spec.callback)
                        .with_label(format!("{}#{}", std::any::type_name::<T>(), index)),
                );
                let names: Vec<&str> = spec.names.iter().map(String::as_str).collect();
                let key = ReceiverKey::Callback {
                    target: target_key,
                    index,
                };
                self.inner.register(key, receiver, &names)
            })
            .sum()
    }

    /// Remove every callback registered for `target` (by identity).
    /// Returns the number of registrations removed.
    pub fn unregister_target<T: ?Sized>(&self, target: &Arc<T>) -> usize {
        let removed = self.inner.registry.remove_target(TargetKey::of(target));
        if removed > 0 {
            debug!(
                target = std::any::type_name::<T>(),
                removed,
                "Unregistered target"
            );
        }
        removed
    }

    /// Remove receivers whose targets have been dropped without waiting for
    /// a delivery to find them. Returns the number of registrations removed.
    pub fn purge_stale(&self) -> usize {
        let removed = self.inner.registry.purge_stale();
        if removed > 0 {
            debug!(removed, "Purged stale receivers");
        }
        removed
    }

    // --- Publishing ---

    /// Queue an event for delivery and return immediately.
    pub fn publish(&self, name: &str, payload: impl Into<Payload>) {
        let data = Arc::new(payload.into().into_data());
        self.inner.publish(name, data);
    }

    /// Store the payload as `name`'s sticky value, then publish it.
    pub fn publish_sticky(&self, name: &str, payload: impl Into<Payload>) {
        let data = Arc::new(payload.into().into_data());
        self.inner.sticky.set(name, Arc::clone(&data));
        self.inner.publish(name, data);
    }

    /// Forget the sticky values for `names`, or all of them when `names` is
    /// empty. Registrations are untouched. Returns the number cleared.
    pub fn clear_sticky(&self, names: &[&str]) -> usize {
        let cleared = self.inner.sticky.clear(names);
        debug!(names = ?names, cleared, "Cleared sticky events");
        cleared
    }

    /// Current sticky value for `name`.
    pub fn sticky(&self, name: &str) -> Option<Arc<EventData>> {
        self.inner.sticky.get(name)
    }

    pub fn sticky_names(&self) -> Vec<EventName> {
        self.inner.sticky.names()
    }

    pub fn sticky_count(&self) -> usize {
        self.inner.sticky.len()
    }

    // --- Dispatch ---

    /// Block until everything queued before this call has been delivered.
    ///
    /// Does not wait when called from a receiver.
    pub fn flush(&self) {
        self.inner.dispatcher.flush(None);
    }

    /// Like [`flush`](Self::flush) but gives up after `timeout`.
    /// Returns true if the queue was drained in time.
    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        self.inner.dispatcher.flush(Some(timeout))
    }

    /// Whether the caller is running on this bus's dispatch thread.
    pub fn is_dispatch_thread(&self) -> bool {
        self.inner.dispatcher.is_dispatch_thread()
    }

    // --- Introspection ---

    /// Receivers registered for exactly `name`, catch-all excluded.
    pub fn receiver_count(&self, name: &str) -> usize {
        self.inner.registry.receiver_count(name)
    }

    pub fn catch_all_count(&self) -> usize {
        self.inner.registry.catch_all_count()
    }

    pub fn is_registered(&self, receiver: &ReceiverRef) -> bool {
        self.inner.registry.is_registered(&ReceiverKey::of(receiver))
    }

    /// Event names with at least one named registration.
    pub fn event_names(&self) -> Vec<EventName> {
        self.inner.registry.event_names()
    }

    pub fn queued(&self) -> usize {
        self.inner.dispatcher.queued()
    }

    pub fn stats(&self) -> BusStats {
        self.inner.dispatcher.stats()
    }
}
