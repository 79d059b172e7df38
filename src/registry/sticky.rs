//! Sticky store: the last payload of every sticky event.

use crate::types::{EventData, EventName};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent mapping from event name to its most recent sticky payload.
pub struct StickyStore {
    events: RwLock<HashMap<EventName, Arc<EventData>>>,
}

impl StickyStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Store `data` as the sticky value for `name`, returning the previous one.
    pub fn set(&self, name: &str, data: Arc<EventData>) -> Option<Arc<EventData>> {
        self.events.write().insert(name.to_string(), data)
    }

    pub fn get(&self, name: &str) -> Option<Arc<EventData>> {
        self.events.read().get(name).cloned()
    }

    /// Snapshot every stored entry, in no particular order.
    pub fn entries(&self) -> Vec<(EventName, Arc<EventData>)> {
        self.events
            .read()
            .iter()
            .map(|(name, data)| (name.clone(), Arc::clone(data)))
            .collect()
    }

    /// Clear the given names, or everything when `names` is empty.
    /// Returns the number of entries removed.
    pub fn clear(&self, names: &[&str]) -> usize {
        let mut events = self.events.write();
        if names.is_empty() {
            let removed = events.len();
            events.clear();
            return removed;
        }
        names
            .iter()
            .filter(|name| events.remove(**name).is_some())
            .count()
    }

    pub fn names(&self) -> Vec<EventName> {
        self.events.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for StickyStore {
    fn default() -> Self {
        Self::new()
    }
}
