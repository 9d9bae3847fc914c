//! Table-scoped change notifications.
//!
//! Subscribers register a callback for one table and receive a content-free
//! [`ChangeKind`] after every accepted write. The payload never carries the
//! row; consumers re-fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

type Callback = Arc<dyn Fn(ChangeKind) + Send + Sync>;

struct Subscriber {
    table: String,
    callback: Callback,
}

/// Registry of live subscriptions
#[derive(Default)]
pub struct ChangeFeed {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl ChangeFeed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `on_change` for writes to `table`
    ///
    /// The returned handle unregisters on `unsubscribe()` or drop.
    pub fn subscribe<F>(self: &Arc<Self>, table: &str, on_change: F) -> Subscription
    where
        F: Fn(ChangeKind) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber {
            table: table.to_string(),
            callback: Arc::new(on_change),
        };

        self.lock().insert(id, subscriber);
        debug!(table, subscription = id, "Subscribed to changes");

        Subscription {
            id,
            table: table.to_string(),
            feed: Arc::downgrade(self),
            released: false,
        }
    }

    /// Deliver `kind` to every subscriber of `table`
    ///
    /// Callbacks run on the calling thread, outside the registry lock.
    pub fn notify(&self, table: &str, kind: ChangeKind) {
        let callbacks: Vec<Callback> = self
            .lock()
            .values()
            .filter(|s| s.table == table)
            .map(|s| Arc::clone(&s.callback))
            .collect();

        debug!(table, ?kind, subscribers = callbacks.len(), "Notifying subscribers");
        for callback in callbacks {
            callback(kind);
        }
    }

    pub fn subscriber_count(&self, table: &str) -> usize {
        self.lock().values().filter(|s| s.table == table).count()
    }

    fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Subscriber>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Change feed registry was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Handle for one standing subscription
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    table: String,
    feed: Weak<ChangeFeed>,
    released: bool,
}

impl Subscription {
    /// Release the subscription. Returns false if it was already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;

        let removed = self.feed.upgrade().is_some_and(|feed| feed.remove(self.id));
        debug!(table = %self.table, subscription = self.id, removed, "Unsubscribed from changes");
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("table", &self.table)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_notify_reaches_only_matching_table() {
        let feed = ChangeFeed::new();
        let (tx, rx) = mpsc::channel();
        let tx_other = tx.clone();

        let _subs = feed.subscribe("thesis_submissions", move |kind| {
            tx.send(("subs", kind)).unwrap();
        });
        let _users = feed.subscribe("system_users", move |kind| {
            tx_other.send(("users", kind)).unwrap();
        });

        feed.notify("thesis_submissions", ChangeKind::Insert);

        assert_eq!(rx.try_recv().unwrap(), ("subs", ChangeKind::Insert));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_releases_exactly_once() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe("thesis_submissions", |_| {});
        assert_eq!(feed.subscriber_count("thesis_submissions"), 1);

        assert!(sub.unsubscribe());
        assert_eq!(feed.subscriber_count("thesis_submissions"), 0);
    }

    #[test]
    fn test_drop_releases_subscription() {
        let feed = ChangeFeed::new();
        {
            let _sub = feed.subscribe("thesis_submissions", |_| {});
            assert_eq!(feed.subscriber_count("thesis_submissions"), 1);
        }
        assert_eq!(feed.subscriber_count("thesis_submissions"), 0);
    }

    #[test]
    fn test_handle_outliving_feed_is_harmless() {
        let feed = ChangeFeed::new();
        let sub = feed.subscribe("thesis_data", |_| {});
        drop(feed);
        assert!(!sub.unsubscribe());
    }

    #[test]
    fn test_callback_may_subscribe_without_deadlock() {
        let feed = ChangeFeed::new();
        let inner_feed = Arc::downgrade(&feed);
        let (tx, rx) = mpsc::channel();

        let _sub = feed.subscribe("thesis_submissions", move |_| {
            if let Some(feed) = inner_feed.upgrade() {
                // Registering from inside a callback must not touch the held lock
                let nested = feed.subscribe("thesis_data", |_| {});
                tx.send(feed.subscriber_count("thesis_data")).unwrap();
                drop(nested);
            }
        });

        feed.notify("thesis_submissions", ChangeKind::Delete);
        assert_eq!(rx.try_recv().unwrap(), 1);
        assert_eq!(feed.subscriber_count("thesis_data"), 0);
    }
}
