use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{Backend, Delivery, FeedId, FeedMessage, FeedSink, ListenerRegistration};
use crate::error::CoreError;
use crate::stats::SharedFeedStats;

/// Which change feed a subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedScope {
    /// The signed-in user's own `recent_messages/{uid}/messages`
    Personal,
    /// The collection of recent messages shared by all users
    Shared,
}

impl std::fmt::Display for FeedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedScope::Personal => f.write_str("personal"),
            FeedScope::Shared => f.write_str("shared"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Open,
    /// The feed reported a transport error and was detached
    Failed(String),
    Closed,
}

/// One push subscription to an ordered collection feed.
///
/// Its sink writes into the channel of the [`FeedHub`] that opened it. The
/// hub routes each delivery back here through `accept`, which drops and
/// counts anything that arrives once the subscription is closed or failed.
pub struct ChangeStreamSubscription {
    id: FeedId,
    scope: FeedScope,
    collection: String,
    order_by: String,
    closed: Arc<AtomicBool>,
    registration: Option<Box<dyn ListenerRegistration>>,
    status: SubscriptionStatus,
    stats: SharedFeedStats,
}

impl ChangeStreamSubscription {
    fn open(
        backend: &dyn Backend,
        id: FeedId,
        scope: FeedScope,
        collection: &str,
        order_by: &str,
        tx: Sender<Delivery>,
        stats: SharedFeedStats,
    ) -> Result<Self, CoreError> {
        if backend.current_identity().is_none() {
            return Err(CoreError::NotAuthenticated);
        }

        let closed = Arc::new(AtomicBool::new(false));
        let sink = FeedSink::new(id, scope, tx, closed.clone());
        let registration = backend
            .subscribe_ordered_by(collection, order_by, sink)
            .map_err(|e| CoreError::SubscriptionTransport {
                scope,
                message: e.to_string(),
            })?;

        tracing::info!(%scope, collection, order_by, feed = id.0, "opened change feed");
        Ok(Self {
            id,
            scope,
            collection: collection.to_string(),
            order_by: order_by.to_string(),
            closed,
            registration: Some(registration),
            status: SubscriptionStatus::Open,
            stats,
        })
    }

    pub fn id(&self) -> FeedId {
        self.id
    }

    pub fn scope(&self) -> FeedScope {
        self.scope
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    pub fn status(&self) -> &SubscriptionStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == SubscriptionStatus::Open
    }

    /// Run a delivered message through this subscription's state.
    ///
    /// A `FeedMessage::Error` moves the subscription to `Failed` and is
    /// returned once so the owner can surface it. Returns `None` when the
    /// subscription is no longer open.
    fn accept(&mut self, message: FeedMessage) -> Option<FeedMessage> {
        if !self.is_open() {
            self.stats.record_dropped(self.scope, 1);
            return None;
        }

        match message {
            FeedMessage::Changes(changes) => {
                self.stats.record_batch(self.scope, &changes);
                Some(FeedMessage::Changes(changes))
            }
            FeedMessage::Error(message) => {
                tracing::warn!(scope = %self.scope, collection = %self.collection, %message, "change feed failed");
                self.stats.record_error(self.scope);
                self.detach();
                self.status = SubscriptionStatus::Failed(message.clone());
                Some(FeedMessage::Error(message))
            }
        }
    }

    /// Detach from the backend. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.status == SubscriptionStatus::Closed {
            return;
        }
        self.detach();
        self.status = SubscriptionStatus::Closed;
        tracing::debug!(scope = %self.scope, collection = %self.collection, "closed change feed");
    }

    fn detach(&mut self) {
        self.closed.store(true, Ordering::Release);
        if let Some(mut registration) = self.registration.take() {
            registration.remove();
        }
    }
}

impl Drop for ChangeStreamSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Every change feed of one session, fanned into a single channel.
///
/// All sinks share one sender, so [`FeedHub::try_next`] yields messages in
/// the order the backend delivered them across feeds. Deliveries from a
/// closed, failed or replaced subscription are dropped there and counted in
/// the stats.
pub struct FeedHub {
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    subscriptions: Vec<ChangeStreamSubscription>,
    next_feed: u64,
    stats: SharedFeedStats,
}

impl FeedHub {
    pub fn new(stats: SharedFeedStats) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            subscriptions: Vec::new(),
            next_feed: 0,
            stats,
        }
    }

    // ===== Getters =====

    pub fn subscriptions(&self) -> &[ChangeStreamSubscription] {
        &self.subscriptions
    }

    pub fn subscription(&self, id: FeedId) -> Option<&ChangeStreamSubscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    /// Scopes of the feeds that are currently delivering
    pub fn open_scopes(&self) -> Vec<FeedScope> {
        self.subscriptions
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.scope)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    // ===== Mutations =====

    /// Attach a new feed. Fails with `NotAuthenticated` if the backend
    /// reports no current identity.
    pub fn open(
        &mut self,
        backend: &dyn Backend,
        scope: FeedScope,
        collection: &str,
        order_by: &str,
    ) -> Result<FeedId, CoreError> {
        let subscription = self.attach(backend, scope, collection, order_by)?;
        let id = subscription.id;
        self.subscriptions.push(subscription);
        Ok(id)
    }

    /// Next delivered message for an open feed, in arrival order. Never blocks.
    pub fn try_next(&mut self) -> Option<(FeedScope, FeedMessage)> {
        while let Ok(Delivery {
            feed,
            scope,
            message,
        }) = self.rx.try_recv()
        {
            match self.subscriptions.iter_mut().find(|s| s.id == feed) {
                Some(subscription) => {
                    if let Some(message) = subscription.accept(message) {
                        return Some((scope, message));
                    }
                }
                None => self.stats.record_dropped(scope, 1),
            }
        }
        None
    }

    /// Replace every failed feed with a fresh subscription to the same
    /// collection. Returns how many were reopened.
    pub fn reopen_failed(&mut self, backend: &dyn Backend) -> Result<usize, CoreError> {
        let mut reopened = 0;
        for i in 0..self.subscriptions.len() {
            if self.subscriptions[i].is_open() {
                continue;
            }
            let (scope, collection, order_by) = {
                let old = &self.subscriptions[i];
                (old.scope, old.collection.clone(), old.order_by.clone())
            };
            self.subscriptions[i] = self.attach(backend, scope, &collection, &order_by)?;
            reopened += 1;
        }
        Ok(reopened)
    }

    /// Close one feed. Its queued deliveries are dropped as they come up.
    pub fn close(&mut self, id: FeedId) -> bool {
        match self.subscriptions.iter_mut().find(|s| s.id == id) {
            Some(subscription) => {
                subscription.close();
                true
            }
            None => false,
        }
    }

    /// Close and forget every feed, dropping whatever is still queued.
    pub fn close_all(&mut self) {
        for subscription in self.subscriptions.iter_mut() {
            subscription.close();
        }
        self.subscriptions.clear();

        let mut dropped = 0u64;
        for delivery in self.rx.try_iter() {
            self.stats.record_dropped(delivery.scope, 1);
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "dropping feed messages delivered after close");
        }
    }

    fn attach(
        &mut self,
        backend: &dyn Backend,
        scope: FeedScope,
        collection: &str,
        order_by: &str,
    ) -> Result<ChangeStreamSubscription, CoreError> {
        self.next_feed += 1;
        ChangeStreamSubscription::open(
            backend,
            FeedId(self.next_feed),
            scope,
            collection,
            order_by,
            self.tx.clone(),
            self.stats.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ChangeKind, Identity, InMemoryBackend, RawFields};

    fn signed_in_backend() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.sign_in(Identity::new("me"));
        backend
    }

    fn open(backend: &InMemoryBackend, stats: &SharedFeedStats) -> (FeedHub, FeedId) {
        let mut hub = FeedHub::new(stats.clone());
        let id = hub
            .open(backend, FeedScope::Personal, "feed", "timestamp")
            .unwrap();
        (hub, id)
    }

    fn batch_ids(message: FeedMessage) -> Vec<String> {
        match message {
            FeedMessage::Changes(changes) => changes.into_iter().map(|c| c.id).collect(),
            FeedMessage::Error(message) => panic!("unexpected error: {}", message),
        }
    }

    #[test]
    fn test_open_requires_identity() {
        let backend = InMemoryBackend::new();
        let mut hub = FeedHub::new(SharedFeedStats::new());
        let result = hub.open(&backend, FeedScope::Personal, "feed", "timestamp");
        assert!(matches!(result, Err(CoreError::NotAuthenticated)));
        assert!(hub.is_empty());
        assert_eq!(backend.listener_count("feed"), 0);
    }

    #[test]
    fn test_open_surfaces_backend_failure() {
        let backend = signed_in_backend();
        backend.fail_subscriptions(true);
        let mut hub = FeedHub::new(SharedFeedStats::new());
        match hub.open(&backend, FeedScope::Shared, "feed", "timestamp") {
            Err(CoreError::SubscriptionTransport { scope, .. }) => assert_eq!(scope, FeedScope::Shared),
            _ => panic!("expected a transport error"),
        }
    }

    #[test]
    fn test_receives_snapshot_then_incremental_changes() {
        let backend = signed_in_backend();
        backend.set_document("feed", "a", RawFields::new());
        let stats = SharedFeedStats::new();
        let (mut hub, _) = open(&backend, &stats);

        match hub.try_next() {
            Some((FeedScope::Personal, FeedMessage::Changes(changes))) => assert_eq!(changes.len(), 1),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(hub.try_next().is_none());

        backend.set_document("feed", "a", RawFields::new());
        match hub.try_next() {
            Some((_, FeedMessage::Changes(changes))) => assert_eq!(changes[0].kind, ChangeKind::Modified),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(stats.snapshot().scope(FeedScope::Personal).batches, 2);
    }

    #[test]
    fn test_messages_interleave_across_feeds_in_arrival_order() {
        let backend = signed_in_backend();
        let mut hub = FeedHub::new(SharedFeedStats::new());
        hub.open(&backend, FeedScope::Personal, "mine", "timestamp")
            .unwrap();
        hub.open(&backend, FeedScope::Shared, "everyone", "timestamp")
            .unwrap();
        // Both initial snapshots are empty
        assert!(hub.try_next().is_some());
        assert!(hub.try_next().is_some());

        backend.set_document("everyone", "z", RawFields::new());
        backend.set_document("mine", "b", RawFields::new());
        backend.set_document("everyone", "a", RawFields::new());

        let mut arrived = Vec::new();
        while let Some((scope, message)) = hub.try_next() {
            arrived.push((scope, batch_ids(message)));
        }
        assert_eq!(
            arrived,
            vec![
                (FeedScope::Shared, vec!["z".to_string()]),
                (FeedScope::Personal, vec!["b".to_string()]),
                (FeedScope::Shared, vec!["a".to_string()]),
            ]
        );
    }

    #[test]
    fn test_close_is_idempotent_and_drops_in_flight_messages() {
        let backend = signed_in_backend();
        let stats = SharedFeedStats::new();
        let (mut hub, id) = open(&backend, &stats);
        backend.set_document("feed", "a", RawFields::new());

        // Snapshot and the add are both still queued
        assert!(hub.close(id));
        assert!(hub.close(id));
        assert_eq!(hub.subscription(id).unwrap().status(), &SubscriptionStatus::Closed);
        assert_eq!(backend.listener_count("feed"), 0);
        assert!(hub.try_next().is_none());

        // Refused at the sink, never queued
        backend.set_document("feed", "b", RawFields::new());
        assert!(hub.try_next().is_none());
        assert_eq!(stats.snapshot().scope(FeedScope::Personal).dropped_after_close, 2);
    }

    #[test]
    fn test_close_all_discards_queue() {
        let backend = signed_in_backend();
        let stats = SharedFeedStats::new();
        let (mut hub, _) = open(&backend, &stats);
        hub.open(&backend, FeedScope::Shared, "shared", "timestamp")
            .unwrap();

        hub.close_all();
        assert!(hub.is_empty());
        assert!(hub.try_next().is_none());
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.scope(FeedScope::Personal).dropped_after_close, 1);
        assert_eq!(snapshot.scope(FeedScope::Shared).dropped_after_close, 1);
    }

    #[test]
    fn test_transport_error_fails_subscription_without_retry() {
        let backend = signed_in_backend();
        let stats = SharedFeedStats::new();
        let (mut hub, id) = open(&backend, &stats);
        let _ = hub.try_next();

        backend.inject_feed_error("feed", "unavailable");
        assert_eq!(
            hub.try_next(),
            Some((FeedScope::Personal, FeedMessage::Error("unavailable".to_string())))
        );
        assert_eq!(
            hub.subscription(id).unwrap().status(),
            &SubscriptionStatus::Failed("unavailable".to_string())
        );
        assert!(hub.try_next().is_none());
        assert!(hub.open_scopes().is_empty());

        backend.set_document("feed", "a", RawFields::new());
        assert!(hub.try_next().is_none());
        assert_eq!(backend.listener_count("feed"), 0);
        assert_eq!(stats.snapshot().scope(FeedScope::Personal).transport_errors, 1);
    }

    #[test]
    fn test_reopen_replaces_failed_feed() {
        let backend = signed_in_backend();
        let (mut hub, old) = open(&backend, &SharedFeedStats::new());
        let _ = hub.try_next();
        backend.inject_feed_error("feed", "lost");
        let _ = hub.try_next();

        backend.set_document("feed", "a", RawFields::new());
        assert_eq!(hub.reopen_failed(&backend).unwrap(), 1);
        assert!(hub.subscription(old).is_none());
        assert_eq!(hub.open_scopes(), vec![FeedScope::Personal]);
        assert_eq!(backend.listener_count("feed"), 1);

        let (_, message) = hub.try_next().unwrap();
        assert_eq!(batch_ids(message), vec!["a".to_string()]);
        assert_eq!(hub.reopen_failed(&backend).unwrap(), 0);
    }

    #[test]
    fn test_delivery_from_another_thread() {
        let backend = signed_in_backend();
        let (mut hub, _) = open(&backend, &SharedFeedStats::new());
        let _ = hub.try_next();

        let writer = backend.clone();
        std::thread::spawn(move || {
            for i in 0..10 {
                writer.set_document("feed", &format!("c{}", i), RawFields::new());
            }
        })
        .join()
        .unwrap();

        let mut received = Vec::new();
        while let Some((_, message)) = hub.try_next() {
            received.extend(batch_ids(message));
        }
        let expected: Vec<String> = (0..10).map(|i| format!("c{}", i)).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_drop_detaches_listener() {
        let backend = signed_in_backend();
        let (hub, _) = open(&backend, &SharedFeedStats::new());
        assert_eq!(backend.listener_count("feed"), 1);
        drop(hub);
        assert_eq!(backend.listener_count("feed"), 0);
    }
}
