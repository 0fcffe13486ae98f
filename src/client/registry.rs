use super::delivery::Delivery;
use crate::topic::{TopicFilter, TopicMatcher};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A subscriber callback
pub type Callback = Arc<dyn Fn(&Delivery<'_>) + Send + Sync>;

/// Identifies one `subscribe` registration
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Entry {
    filter: TopicFilter,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Callbacks matched for one filter, in registration order
pub(crate) struct Matched {
    pub filter: TopicFilter,
    pub callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Topic filters and their callbacks.
///
/// Filters are kept in the order they were first registered, callbacks in
/// the order they were added. Both orders are the dispatch order.
pub(crate) struct Registry {
    entries: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append `callback` under `filter`. Returns the new id and whether the
    /// filter was not registered before.
    pub fn insert(&self, filter: TopicFilter, callback: Callback) -> (SubscriptionId, bool) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.filter == filter) {
            Some(entry) => {
                entry.callbacks.push((id, callback));
                (id, false)
            }
            None => {
                entries.push(Entry {
                    filter,
                    callbacks: vec![(id, callback)],
                });
                (id, true)
            }
        }
    }

    /// Remove one registration. Returns its filter and whether that was the
    /// filter's last callback.
    pub fn remove(&self, id: SubscriptionId) -> Option<(TopicFilter, bool)> {
        let mut entries = self.entries.write();
        let pos = entries
            .iter()
            .position(|e| e.callbacks.iter().any(|(cb_id, _)| *cb_id == id))?;
        entries[pos].callbacks.retain(|(cb_id, _)| *cb_id != id);
        if entries[pos].callbacks.is_empty() {
            let entry = entries.remove(pos);
            Some((entry.filter, true))
        } else {
            Some((entries[pos].filter.clone(), false))
        }
    }

    /// Snapshot of every filter matching `topic` with its callbacks. The lock
    /// is released before the caller invokes anything.
    pub fn matching(&self, matcher: &dyn TopicMatcher, topic: &str) -> Vec<Matched> {
        self.entries
            .read()
            .iter()
            .filter(|e| matcher.matches(&e.filter, topic))
            .map(|e| Matched {
                filter: e.filter.clone(),
                callbacks: e.callbacks.clone(),
            })
            .collect()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.iter().map(|e| e.callbacks.len()).sum();
        entries.clear();
        removed
    }

    pub fn filter_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn callback_count(&self) -> usize {
        self.entries.read().iter().map(|e| e.callbacks.len()).sum()
    }
}
