use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use super::fields;
use super::{
    Backend, ChangeEvent, ChangeKind, FeedMessage, FeedSink, Identity, ListenerRegistration,
    RawFields,
};
use crate::error::BackendError;

struct Listener {
    id: u64,
    sink: FeedSink,
}

#[derive(Default)]
struct State {
    identity: Option<Identity>,
    /// collection path -> document id -> fields
    collections: HashMap<String, BTreeMap<String, RawFields>>,
    listeners: HashMap<String, Vec<Listener>>,
    next_listener_id: u64,
    fail_next_get: Option<BackendError>,
    fail_subscriptions: bool,
}

impl State {
    /// Push to every listener on `collection`, pruning the ones whose
    /// subscriber has gone away.
    fn broadcast(&mut self, collection: &str, message: FeedMessage) {
        if let Some(listeners) = self.listeners.get_mut(collection) {
            listeners.retain(|l| l.sink.deliver(message.clone()));
        }
    }
}

/// Thread-safe in-process document store with push listeners.
///
/// Stands in for the hosted database in tests and in the replay CLI.
/// Deliveries happen synchronously on whichever thread performs the write,
/// which is exactly the "unspecified delivery thread" the core has to cope
/// with.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::debug!(uid = %identity.uid, "in-memory backend sign-in");
        self.state.lock().identity = Some(identity);
    }

    /// Create or overwrite a document, emitting `Added` or `Modified`.
    pub fn set_document(&self, collection: &str, id: &str, data: RawFields) {
        let mut state = self.state.lock();
        let docs = state.collections.entry(collection.to_string()).or_default();
        let kind = if docs.contains_key(id) {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        docs.insert(id.to_string(), data.clone());
        let event = ChangeEvent::new(kind, id, data);
        state.broadcast(collection, FeedMessage::Changes(vec![event]));
    }

    /// Create a document under a generated id and return that id.
    pub fn add_document(&self, collection: &str, data: RawFields) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.set_document(collection, &id, data);
        id
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Option<RawFields> {
        let mut state = self.state.lock();
        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))?;
        let event = ChangeEvent::new(ChangeKind::Removed, id, removed.clone());
        state.broadcast(collection, FeedMessage::Changes(vec![event]));
        Some(removed)
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<RawFields> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Push a batch to listeners without touching stored documents.
    ///
    /// Simulates redelivery after a reconnect (duplicates, stale or
    /// reordered changes).
    pub fn replay_changes(&self, collection: &str, changes: Vec<ChangeEvent>) {
        self.state
            .lock()
            .broadcast(collection, FeedMessage::Changes(changes));
    }

    /// Fail every listener on `collection`. Failed listeners are detached.
    pub fn inject_feed_error(&self, collection: &str, message: &str) {
        let mut state = self.state.lock();
        if let Some(listeners) = state.listeners.remove(collection) {
            tracing::debug!(collection, count = listeners.len(), "injecting feed error");
            for listener in listeners {
                listener.sink.deliver(FeedMessage::Error(message.to_string()));
            }
        }
    }

    /// Make the next `get_document` call fail with `error`.
    pub fn fail_next_get(&self, error: BackendError) {
        self.state.lock().fail_next_get = Some(error);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.state.lock().fail_subscriptions = fail;
    }

    pub fn listener_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .listeners
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

/// Sort key for the initial snapshot: timestamps first, then integers.
fn order_key(data: &RawFields, order_by: &str) -> (i64, u32) {
    if let Some(ts) = fields::timestamp(data, order_by) {
        return (ts.timestamp(), ts.timestamp_subsec_nanos());
    }
    match fields::integer(data, order_by) {
        Some(n) => (n, 0),
        None => (i64::MIN, 0),
    }
}

struct MemoryRegistration {
    state: Weak<Mutex<State>>,
    collection: String,
    id: u64,
    removed: bool,
}

impl ListenerRegistration for MemoryRegistration {
    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            if let Some(listeners) = state.listeners.get_mut(&self.collection) {
                listeners.retain(|l| l.id != self.id);
            }
        }
    }
}

impl Backend for InMemoryBackend {
    fn current_identity(&self) -> Option<Identity> {
        self.state.lock().identity.clone()
    }

    fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawFields>, BackendError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_get.take() {
            return Err(error);
        }
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn subscribe_ordered_by(
        &self,
        collection: &str,
        order_by: &str,
        sink: FeedSink,
    ) -> Result<Box<dyn ListenerRegistration>, BackendError> {
        let mut state = self.state.lock();
        if state.fail_subscriptions {
            return Err(BackendError::Unavailable {
                message: format!("cannot listen to {}", collection),
            });
        }

        let mut snapshot: Vec<(&String, &RawFields)> = state
            .collections
            .get(collection)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();
        snapshot.sort_by_key(|(_, data)| order_key(data, order_by));
        let initial: Vec<ChangeEvent> = snapshot
            .into_iter()
            .map(|(id, data)| ChangeEvent::added(id.clone(), data.clone()))
            .collect();

        // Delivered under the lock so no later write can overtake the snapshot
        sink.deliver(FeedMessage::Changes(initial));

        state.next_listener_id += 1;
        let id = state.next_listener_id;
        state
            .listeners
            .entry(collection.to_string())
            .or_default()
            .push(Listener { id, sink });

        Ok(Box::new(MemoryRegistration {
            state: Arc::downgrade(&self.state),
            collection: collection.to_string(),
            id,
            removed: false,
        }))
    }

    fn update_document(
        &self,
        collection: &str,
        id: &str,
        update: RawFields,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let doc = state
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| BackendError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        doc.extend(update);
        let event = ChangeEvent::modified(id, doc.clone());
        state.broadcast(collection, FeedMessage::Changes(vec![event]));
        Ok(())
    }

    fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, RawFields)>, BackendError> {
        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| data.get(field) == Some(value))
                    .map(|(id, data)| (id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        self.state.lock().identity = None;
        Ok(())
    }
}
