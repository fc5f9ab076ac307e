//! Catalog change fan-out
//!
//! Subscribers are notified synchronously on the mutating path whenever a
//! tool becomes visible (registered or re-enabled) or stops being visible
//! (deregistered or disabled). Subscriber work must be quick and must not
//! fail the catalog operation: errors are logged and swallowed.

use std::sync::RwLock;

/// Receives catalog change notifications
pub trait CatalogSubscriber: Send + Sync {
    /// A tool became visible under the given canonical name
    fn on_items_added(&self, name: &str) -> Result<(), crate::McpError>;

    /// Tools stopped being visible under the given canonical names
    fn on_items_removed(&self, names: &[String]);
}

/// Registry of catalog subscribers
#[derive(Default)]
pub struct CatalogEvents {
    subscribers: RwLock<Vec<std::sync::Arc<dyn CatalogSubscriber>>>,
}

impl CatalogEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: std::sync::Arc<dyn CatalogSubscriber>) {
        self.subscribers.write().expect("subscriber lock poisoned").push(subscriber);
    }

    /// Notify subscribers of an added item, best-effort
    pub fn publish_added(&self, name: &str) {
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            if let Err(e) = subscriber.on_items_added(name) {
                tracing::error!(tool = name, error = %e, "item addition callback failed");
            }
        }
    }

    /// Notify subscribers of removed items
    pub fn publish_removed(&self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
        for subscriber in subscribers.iter() {
            subscriber.on_items_removed(names);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingSubscriber {
        added: AtomicUsize,
        removed: AtomicUsize,
    }

    impl CatalogSubscriber for CountingSubscriber {
        fn on_items_added(&self, _name: &str) -> Result<(), crate::McpError> {
            self.added.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_items_removed(&self, names: &[String]) {
            self.removed.fetch_add(names.len(), Ordering::SeqCst);
        }
    }

    struct FailingSubscriber;

    impl CatalogSubscriber for FailingSubscriber {
        fn on_items_added(&self, _name: &str) -> Result<(), crate::McpError> {
            Err(crate::McpError::Internal("boom".to_string()))
        }

        fn on_items_removed(&self, _names: &[String]) {}
    }

    #[test]
    fn events_reach_every_subscriber() {
        let events = CatalogEvents::new();
        let first = Arc::new(CountingSubscriber::default());
        let second = Arc::new(CountingSubscriber::default());
        events.subscribe(first.clone());
        events.subscribe(second.clone());

        events.publish_added("git__commit");
        events.publish_removed(&["git__commit".to_string(), "git__push".to_string()]);

        for subscriber in [&first, &second] {
            assert_eq!(subscriber.added.load(Ordering::SeqCst), 1);
            assert_eq!(subscriber.removed.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn failing_subscriber_does_not_poison_the_bus() {
        let events = CatalogEvents::new();
        let counting = Arc::new(CountingSubscriber::default());
        events.subscribe(Arc::new(FailingSubscriber));
        events.subscribe(counting.clone());

        events.publish_added("time__now");
        assert_eq!(counting.added.load(Ordering::SeqCst), 1);
    }
}
