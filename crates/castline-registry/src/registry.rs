//! The live subscription set.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{ChannelPattern, Listener};

/// Identifies one registered subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

struct Entry {
    pattern: ChannelPattern,
    listener: Arc<dyn Listener>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    entries: BTreeMap<SubscriptionId, Entry>,
}

/// Thread-safe set of `(pattern, listener)` pairs.
///
/// Mutation and lookup may happen from any thread. [`matching`] returns a
/// snapshot, so listeners are invoked without holding the lock and may
/// subscribe or unsubscribe from inside a callback.
///
/// [`matching`]: SubscriptionRegistry::matching
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns its id. Ids are never reused.
    pub fn add(&self, pattern: ChannelPattern, listener: Arc<dyn Listener>) -> SubscriptionId {
        let mut inner = self.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        tracing::debug!(%id, %pattern, "subscription added");
        inner.entries.insert(id, Entry { pattern, listener });
        id
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().entries.remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "subscription removed");
        }
        removed
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.lock().entries.contains_key(&id)
    }

    /// Listeners whose pattern matches `channel`, in registration order.
    pub fn matching(&self, channel: &str) -> Vec<Arc<dyn Listener>> {
        self.lock()
            .entries
            .values()
            .filter(|entry| entry.pattern.matches(channel))
            .map(|entry| Arc::clone(&entry.listener))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Removes every subscription.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    // A listener panicking elsewhere cannot leave `Inner` half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn Listener>) {
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let listener: Arc<dyn Listener> = Arc::new(move |_: &str, _: &[u8]| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    #[test]
    fn test_add_assigns_increasing_ids() {
        let registry = SubscriptionRegistry::new();
        let (_, listener) = counting();
        let a = registry.add("A".into(), Arc::clone(&listener));
        let b = registry.add("A".into(), listener);
        assert!(b > a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_matching_selects_exact_and_regex() {
        let registry = SubscriptionRegistry::new();
        let (_, exact) = counting();
        let (_, wildcard) = counting();
        let (_, other) = counting();
        registry.add("SENSOR_TEMP".into(), exact);
        registry.add(ChannelPattern::regex("SENSOR_.*").unwrap(), wildcard);
        registry.add("POSE".into(), other);

        assert_eq!(registry.matching("SENSOR_TEMP").len(), 2);
        assert_eq!(registry.matching("SENSOR_HUM").len(), 1);
        assert_eq!(registry.matching("NOPE").len(), 0);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let (_, listener) = counting();
        let id = registry.add("A".into(), listener);

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(!registry.contains(id));
        assert!(registry.matching("A").is_empty());
    }

    #[test]
    fn test_matching_is_a_snapshot() {
        let registry = SubscriptionRegistry::new();
        let (count, listener) = counting();
        let id = registry.add("A".into(), listener);

        let snapshot = registry.matching("A");
        registry.remove(id);
        for listener in &snapshot {
            listener.on_message("A", b"x");
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handle = Arc::clone(&registry);
        let slot = Arc::new(Mutex::new(None::<SubscriptionId>));
        let own = Arc::clone(&slot);
        let id = registry.add(
            "A".into(),
            Arc::new(move |_: &str, _: &[u8]| {
                if let Some(id) = *own.lock().unwrap() {
                    handle.remove(id);
                }
            }),
        );
        *slot.lock().unwrap() = Some(id);

        for listener in registry.matching("A") {
            listener.on_message("A", b"");
        }
        assert!(!registry.contains(id));
    }

    #[test]
    fn test_subscription_id_display() {
        assert_eq!(SubscriptionId(3).to_string(), "S-3");
    }
}
