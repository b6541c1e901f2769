use chrono::{DateTime, Utc};

use crate::backend::{ChangeEvent, ChangeKind};
use crate::config::RemovalPolicy;
use crate::models::ConversationSummary;

pub type ObserverId = u64;

type Observer = Box<dyn FnMut(&[ConversationSummary])>;

/// Effect of one change event on the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// New conversation, placed at the front
    Inserted { id: String },
    /// Existing conversation replaced and moved from `from` to the front
    Promoted { id: String, from: usize },
    Removed { id: String, from: usize },
    Unchanged,
}

impl StoreChange {
    pub fn is_change(&self) -> bool {
        !matches!(self, StoreChange::Unchanged)
    }
}

/// Recent conversations, most recently changed first.
///
/// Order follows event arrival, not message timestamps: every `Added` or
/// `Modified` event removes any existing entry for its id and inserts the
/// freshly decoded summary at index 0. At most one entry exists per id.
pub struct SummaryStore {
    items: Vec<ConversationSummary>,
    removal_policy: RemovalPolicy,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: ObserverId,
    revision: u64,
}

impl Default for SummaryStore {
    fn default() -> Self {
        Self::new(RemovalPolicy::default())
    }
}

impl SummaryStore {
    pub fn new(removal_policy: RemovalPolicy) -> Self {
        Self {
            items: Vec::new(),
            removal_policy,
            observers: Vec::new(),
            next_observer_id: 0,
            revision: 0,
        }
    }

    // ===== Getters =====

    pub fn items(&self) -> &[ConversationSummary] {
        &self.items
    }

    pub fn snapshot(&self) -> Vec<ConversationSummary> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn front(&self) -> Option<&ConversationSummary> {
        self.items.first()
    }

    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.items.iter().find(|s| s.conversation_id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|s| s.conversation_id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|s| s.conversation_id.as_str()).collect()
    }

    /// Bumped on every mutation of the list
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    // ===== Observers =====

    /// Register a callback invoked with the full ordered list after each change.
    pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&[ConversationSummary]) + 'static,
    {
        self.next_observer_id += 1;
        let id = self.next_observer_id;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    // ===== Mutations =====

    pub fn apply(&mut self, event: &ChangeEvent) -> StoreChange {
        let change = self.reconcile(event, Utc::now());
        if change.is_change() {
            self.notify();
        }
        change
    }

    /// Apply a batch in delivery order, notifying observers at most once.
    pub fn apply_batch(&mut self, events: &[ChangeEvent]) -> Vec<StoreChange> {
        let now = Utc::now();
        let changes: Vec<StoreChange> = events.iter().map(|e| self.reconcile(e, now)).collect();
        if changes.iter().any(StoreChange::is_change) {
            self.notify();
        }
        changes
    }

    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.revision += 1;
        self.notify();
    }

    fn reconcile(&mut self, event: &ChangeEvent, decoded_at: DateTime<Utc>) -> StoreChange {
        let existing = self.position(&event.id);

        let change = match event.kind {
            ChangeKind::Added | ChangeKind::Modified => {
                if let Some(index) = existing {
                    self.items.remove(index);
                }
                let summary = ConversationSummary::from_fields_at(&event.id, &event.data, decoded_at);
                self.items.insert(0, summary);
                match existing {
                    Some(from) => StoreChange::Promoted {
                        id: event.id.clone(),
                        from,
                    },
                    None => StoreChange::Inserted {
                        id: event.id.clone(),
                    },
                }
            }
            ChangeKind::Removed => match (self.removal_policy, existing) {
                (RemovalPolicy::Delete, Some(from)) => {
                    self.items.remove(from);
                    StoreChange::Removed {
                        id: event.id.clone(),
                        from,
                    }
                }
                _ => StoreChange::Unchanged,
            },
        };

        if change.is_change() {
            self.revision += 1;
            tracing::trace!(id = %event.id, kind = ?event.kind, len = self.items.len(), "reconciled summary");
        }
        change
    }

    fn notify(&mut self) {
        let items = &self.items;
        for (_, observer) in self.observers.iter_mut() {
            observer(items);
        }
    }
}
