use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::backend::{ChangeEvent, ChangeKind};
use crate::subscription::FeedScope;

/// Counters for one feed scope
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScopeStats {
    pub batches: u64,
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
    /// Messages that arrived after the subscription was closed
    pub dropped_after_close: u64,
    pub transport_errors: u64,
}

impl ScopeStats {
    pub fn events(&self) -> u64 {
        self.added + self.modified + self.removed
    }
}

/// Stats for change events received from the backend feeds
#[derive(Debug, Default, Clone)]
pub struct FeedStats {
    pub by_scope: HashMap<FeedScope, ScopeStats>,
}

impl FeedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, scope: FeedScope, changes: &[ChangeEvent]) {
        let stats = self.by_scope.entry(scope).or_default();
        stats.batches += 1;
        for change in changes {
            match change.kind {
                ChangeKind::Added => stats.added += 1,
                ChangeKind::Modified => stats.modified += 1,
                ChangeKind::Removed => stats.removed += 1,
            }
        }
    }

    pub fn record_dropped(&mut self, scope: FeedScope, count: u64) {
        self.by_scope.entry(scope).or_default().dropped_after_close += count;
    }

    pub fn record_error(&mut self, scope: FeedScope) {
        self.by_scope.entry(scope).or_default().transport_errors += 1;
    }

    pub fn scope(&self, scope: FeedScope) -> ScopeStats {
        self.by_scope.get(&scope).cloned().unwrap_or_default()
    }

    /// Total change events across all scopes
    pub fn total_events(&self) -> u64 {
        self.by_scope.values().map(ScopeStats::events).sum()
    }
}

/// Thread-safe wrapper for feed stats
#[derive(Debug, Clone)]
pub struct SharedFeedStats {
    inner: Arc<RwLock<FeedStats>>,
}

impl Default for SharedFeedStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedFeedStats {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(FeedStats::new())),
        }
    }

    pub fn record_batch(&self, scope: FeedScope, changes: &[ChangeEvent]) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_batch(scope, changes);
        }
    }

    pub fn record_dropped(&self, scope: FeedScope, count: u64) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_dropped(scope, count);
        }
    }

    pub fn record_error(&self, scope: FeedScope) {
        if let Ok(mut stats) = self.inner.write() {
            stats.record_error(scope);
        }
    }

    pub fn snapshot(&self) -> FeedStats {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}
