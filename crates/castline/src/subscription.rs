//! Handle for a registered listener.

use std::sync::{Arc, Weak};

use castline_registry::{ChannelPattern, SubscriptionId, SubscriptionRegistry};

/// Returned by [`Connection::subscribe`](crate::Connection::subscribe).
///
/// Dropping the handle does *not* unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). The handle does not keep the
/// connection alive.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    pattern: ChannelPattern,
    registry: Weak<SubscriptionRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        pattern: ChannelPattern,
        registry: &Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            id,
            pattern,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &ChannelPattern {
        &self.pattern
    }

    /// Stops delivery to this listener. Messages already being dispatched
    /// may still arrive; no new dispatch starts after this returns.
    ///
    /// Calling it again, or after the connection is gone, does nothing.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }

    /// Returns `true` while the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}
