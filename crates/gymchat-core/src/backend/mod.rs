//! Backend collaborator seam
//!
//! The cloud document database and its auth service are consumed through the
//! [`Backend`] trait. The session controller and every subscription receive an
//! `Arc<dyn Backend>` at construction; nothing in the core reaches for a
//! process-wide client.

pub mod fields;
pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::subscription::FeedScope;

pub use memory::InMemoryBackend;

/// Untyped document body as delivered by the backend.
pub type RawFields = Map<String, Value>;

/// The signed-in user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change from a collection feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub id: String,
    pub data: RawFields,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, id: impl Into<String>, data: RawFields) -> Self {
        Self {
            kind,
            id: id.into(),
            data,
        }
    }

    pub fn added(id: impl Into<String>, data: RawFields) -> Self {
        Self::new(ChangeKind::Added, id, data)
    }

    pub fn modified(id: impl Into<String>, data: RawFields) -> Self {
        Self::new(ChangeKind::Modified, id, data)
    }

    pub fn removed(id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Removed, id, RawFields::new())
    }
}

/// What a feed pushes to its subscriber: a batch of changes, or a transport failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Changes(Vec<ChangeEvent>),
    Error(String),
}

/// Identifies one attached feed within a session's shared channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedId(pub u64);

/// A feed message tagged with the feed that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub feed: FeedId,
    pub scope: FeedScope,
    pub message: FeedMessage,
}

/// Sending half of a feed channel, handed to the backend on subscribe.
///
/// The backend may call [`FeedSink::deliver`] from any thread. Sinks of
/// several feeds can share one channel; the receiver then sees their
/// messages in the order they were delivered. Once the owning subscription
/// is closed, delivery is refused and the message is dropped.
#[derive(Debug, Clone)]
pub struct FeedSink {
    feed: FeedId,
    scope: FeedScope,
    tx: Sender<Delivery>,
    closed: Arc<AtomicBool>,
}

impl FeedSink {
    pub(crate) fn new(
        feed: FeedId,
        scope: FeedScope,
        tx: Sender<Delivery>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            feed,
            scope,
            tx,
            closed,
        }
    }

    /// Push a message to the subscriber. Returns false if it was dropped.
    pub fn deliver(&self, message: FeedMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx
            .send(Delivery {
                feed: self.feed,
                scope: self.scope,
                message,
            })
            .is_ok()
    }

    pub fn feed(&self) -> FeedId {
        self.feed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle returned by the backend for an attached listener.
pub trait ListenerRegistration: Send {
    /// Detach the listener. Must tolerate repeated calls.
    fn remove(&mut self);
}

/// Operations the core consumes from the document database and auth service.
pub trait Backend: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;

    /// Single point lookup. `Ok(None)` means the document does not exist.
    fn get_document(&self, collection: &str, id: &str) -> Result<Option<RawFields>, BackendError>;

    /// Attach a push listener to `collection`, ordered ascending by `order_by`.
    ///
    /// The first batch delivered is the current contents as `Added` changes;
    /// every later batch is incremental.
    fn subscribe_ordered_by(
        &self,
        collection: &str,
        order_by: &str,
        sink: FeedSink,
    ) -> Result<Box<dyn ListenerRegistration>, BackendError>;

    /// Merge `fields` into an existing document.
    fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: RawFields,
    ) -> Result<(), BackendError>;

    /// All documents in `collection` whose `field` equals `value`.
    fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<(String, RawFields)>, BackendError>;

    fn sign_out(&self) -> Result<(), BackendError>;
}
