//! Subscription registry: which receivers want which events.

use crate::receivers::ReceiverRef;
use crate::types::{EventName, ReceiverKey, TargetKey};
use parking_lot::RwLock;
use std::collections::HashMap;

type Bucket = HashMap<ReceiverKey, ReceiverRef>;

#[derive(Default)]
struct Buckets {
    /// Receivers registered without names.
    catch_all: Bucket,
    /// Receivers by event name. Emptied buckets are removed.
    named: HashMap<EventName, Bucket>,
}

impl Buckets {
    fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&ReceiverKey, &ReceiverRef) -> bool,
    {
        let before = self.slot_count();
        self.catch_all.retain(|k, r| !pred(k, r));
        for bucket in self.named.values_mut() {
            bucket.retain(|k, r| !pred(k, r));
        }
        self.named.retain(|_, bucket| !bucket.is_empty());
        before - self.slot_count()
    }

    fn slot_count(&self) -> usize {
        self.catch_all.len() + self.named.values().map(HashMap::len).sum::<usize>()
    }
}

/// Concurrent mapping from event name to registered receivers, plus a
/// catch-all bucket no event name can address.
///
/// Every operation is a short critical section on one lock; receivers are
/// never invoked while it is held.
pub struct SubscriptionRegistry {
    buckets: RwLock<Buckets>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(Buckets::default()),
        }
    }

    /// Add a receiver to the catch-all bucket (no names) or to each named
    /// bucket.
    ///
    /// `on_added` runs under the registry lock once per newly created slot,
    /// with `None` for the catch-all slot. Slots that already existed are
    /// left untouched and do not trigger it. Returns the number of new slots.
    pub fn register<F>(
        &self,
        key: ReceiverKey,
        receiver: &ReceiverRef,
        names: &[&str],
        mut on_added: F,
    ) -> usize
    where
        F: FnMut(Option<&str>),
    {
        let mut buckets = self.buckets.write();
        let mut added = 0;

        if names.is_empty() {
            if !buckets.catch_all.contains_key(&key) {
                on_added(None);
                buckets.catch_all.insert(key, receiver.clone());
                added += 1;
            }
            return added;
        }

        for name in names {
            let bucket = buckets.named.entry((*name).to_string()).or_default();
            if !bucket.contains_key(&key) {
                on_added(Some(*name));
                bucket.insert(key, receiver.clone());
                added += 1;
            }
        }
        added
    }

    /// Remove a receiver from every bucket. Returns the number of slots freed.
    pub fn remove(&self, key: &ReceiverKey) -> usize {
        self.buckets.write().remove_where(|k, _| k == key)
    }

    /// Remove every callback registration belonging to `target`.
    pub fn remove_target(&self, target: TargetKey) -> usize {
        self.buckets
            .write()
            .remove_where(|k, _| k.target() == Some(target))
    }

    /// Remove every receiver reporting itself stale.
    pub fn purge_stale(&self) -> usize {
        self.buckets.write().remove_where(|_, r| r.is_stale())
    }

    /// Snapshot the receivers eligible for `name`: catch-all plus named.
    ///
    /// Each receiver appears once even if it sits in both buckets.
    pub fn audience(&self, name: &str) -> Vec<(ReceiverKey, ReceiverRef)> {
        let buckets = self.buckets.read();
        let mut audience: Bucket = buckets.catch_all.clone();
        if let Some(bucket) = buckets.named.get(name) {
            for (key, receiver) in bucket {
                audience.entry(*key).or_insert_with(|| receiver.clone());
            }
        }
        audience.into_iter().collect()
    }

    /// Whether `key` is currently in the audience for `name`.
    pub fn contains(&self, name: &str, key: &ReceiverKey) -> bool {
        let buckets = self.buckets.read();
        buckets.catch_all.contains_key(key)
            || buckets
                .named
                .get(name)
                .is_some_and(|bucket| bucket.contains_key(key))
    }

    /// Whether `key` is registered anywhere.
    pub fn is_registered(&self, key: &ReceiverKey) -> bool {
        let buckets = self.buckets.read();
        buckets.catch_all.contains_key(key)
            || buckets.named.values().any(|bucket| bucket.contains_key(key))
    }

    /// Receivers registered under exactly this name, catch-all excluded.
    pub fn receiver_count(&self, name: &str) -> usize {
        self.buckets.read().named.get(name).map_or(0, HashMap::len)
    }

    pub fn catch_all_count(&self) -> usize {
        self.buckets.read().catch_all.len()
    }

    /// Names with at least one registered receiver.
    pub fn event_names(&self) -> Vec<EventName> {
        self.buckets.read().named.keys().cloned().collect()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
