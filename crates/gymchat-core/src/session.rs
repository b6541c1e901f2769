use std::sync::Arc;

use serde_json::json;

use crate::backend::{Backend, FeedMessage, Identity, RawFields};
use crate::config::CoreConfig;
use crate::constants::fields;
use crate::error::CoreError;
use crate::events::CoreEvent;
use crate::models::{ChatUser, ConversationSummary};
use crate::stats::SharedFeedStats;
use crate::store::{ObserverId, StoreChange, SummaryStore};
use crate::subscription::{FeedHub, FeedScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoadingProfile,
    Active(Identity),
}

/// Binds the feeds and the conversation list to the signed-in identity.
///
/// All mutation happens through `&mut self` on the owning context. Feed
/// batches pushed by the backend sit in one shared channel until
/// [`SessionController::pump`] drains them in arrival order, so the list is
/// never touched from the backend's delivery thread.
pub struct SessionController {
    backend: Arc<dyn Backend>,
    config: CoreConfig,
    state: SessionState,
    profile: Option<ChatUser>,
    store: SummaryStore,
    feeds: FeedHub,
    error_message: Option<String>,
    pending_events: Vec<CoreEvent>,
    stats: SharedFeedStats,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>, config: CoreConfig) -> Self {
        let store = SummaryStore::new(config.removal_policy);
        let stats = SharedFeedStats::new();
        Self {
            backend,
            config,
            state: SessionState::LoggedOut,
            profile: None,
            store,
            feeds: FeedHub::new(stats.clone()),
            error_message: None,
            pending_events: Vec::new(),
            stats,
        }
    }

    // ===== Getters =====

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Active(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&ChatUser> {
        self.profile.as_ref()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    pub fn summaries(&self) -> &[ConversationSummary] {
        self.store.items()
    }

    pub fn stats(&self) -> SharedFeedStats {
        self.stats.clone()
    }

    /// Scopes of the feeds that are currently delivering
    pub fn open_feeds(&self) -> Vec<FeedScope> {
        self.feeds.open_scopes()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    pub fn subscribe_summaries<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&[ConversationSummary]) + 'static,
    {
        self.store.subscribe(observer)
    }

    pub fn unsubscribe_summaries(&mut self, id: ObserverId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Take every event queued since the last drain.
    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // ===== Lifecycle =====

    /// Move from `LoggedOut` to `Active` for the backend's current identity.
    ///
    /// Fetches the profile once, then opens the personal feed and, when
    /// configured, the shared feed into a freshly cleared list. Any failure
    /// leaves the controller `LoggedOut` with an error message; nothing is
    /// retried. A no-op unless currently `LoggedOut`.
    pub fn start_session(&mut self) -> Result<(), CoreError> {
        if self.state != SessionState::LoggedOut {
            return Ok(());
        }

        let identity = match self.backend.current_identity() {
            Some(identity) => identity,
            None => return Err(self.fail(CoreError::NotAuthenticated)),
        };

        self.transition(SessionState::LoadingProfile);

        let profile = match self.fetch_profile(&identity) {
            Ok(profile) => profile,
            Err(e) => {
                self.transition(SessionState::LoggedOut);
                return Err(self.fail(e));
            }
        };

        self.clear_summaries();
        let feeds = match self.open_all_feeds(&identity) {
            Ok(feeds) => feeds,
            Err(e) => {
                self.transition(SessionState::LoggedOut);
                return Err(self.fail(e));
            }
        };

        self.feeds = feeds;
        self.profile = Some(profile.clone());
        self.error_message = None;
        self.pending_events.push(CoreEvent::ProfileLoaded(profile));
        self.transition(SessionState::Active(identity));
        Ok(())
    }

    /// Apply everything the feeds have delivered, then return queued events.
    ///
    /// Batches from the personal and shared feeds are applied in the order
    /// they arrived, so the most recent delivery wins position 0 and the
    /// latest data for an id.
    pub fn pump(&mut self) -> Vec<CoreEvent> {
        let mut changed = false;
        let mut failures = Vec::new();

        while let Some((scope, message)) = self.feeds.try_next() {
            match message {
                FeedMessage::Changes(changes) => {
                    if self.store.apply_batch(&changes).iter().any(StoreChange::is_change) {
                        changed = true;
                    }
                }
                FeedMessage::Error(message) => failures.push((scope, message)),
            }
        }

        if changed {
            self.queue_summaries_changed();
        }
        for (scope, message) in failures {
            let error = CoreError::SubscriptionTransport {
                scope,
                message: message.clone(),
            };
            self.error_message = Some(error.to_string());
            self.pending_events.push(CoreEvent::FeedError { scope, message });
        }

        self.drain_events()
    }

    /// Reopen feeds that failed. Returns how many were reopened.
    pub fn reopen_failed_feeds(&mut self) -> Result<usize, CoreError> {
        if !self.is_active() {
            return Err(self.fail(CoreError::NotAuthenticated));
        }

        let reopened = match self.feeds.reopen_failed(self.backend.as_ref()) {
            Ok(reopened) => reopened,
            Err(e) => return Err(self.fail(e)),
        };

        if reopened > 0 {
            tracing::info!(reopened, "reopened failed change feeds");
        }
        Ok(reopened)
    }

    /// Close every feed, clear the list and the profile, and sign out.
    ///
    /// Local state always ends `LoggedOut`; a backend sign-out failure is
    /// only logged.
    pub fn sign_out(&mut self) {
        self.feeds.close_all();
        self.clear_summaries();
        self.profile = None;

        if let Err(e) = self.backend.sign_out() {
            tracing::warn!(error = %e, "backend sign-out failed");
        }
        if self.state != SessionState::LoggedOut {
            self.transition(SessionState::LoggedOut);
        }
    }

    // ===== Profile operations =====

    /// Write `selectedGym` on the current user's document. Requires an
    /// `Active` session.
    pub fn update_gym_for_current_user(&mut self, selected_gym: i64) -> Result<(), CoreError> {
        let identity = match self.current_identity() {
            Some(identity) => identity,
            None => return Err(self.fail(CoreError::NotAuthenticated)),
        };

        let mut update = RawFields::new();
        update.insert(fields::SELECTED_GYM.to_string(), json!(selected_gym));
        if let Err(e) =
            self.backend
                .update_document(&self.config.users_collection, &identity.uid, update)
        {
            tracing::warn!(error = %e, "failed to update gym");
            return Err(self.fail(CoreError::Backend(e)));
        }

        tracing::info!(uid = %identity.uid, selected_gym, "updated gym selection");
        if let Some(profile) = self.profile.as_mut() {
            profile.selected_gym = Some(selected_gym);
        }
        Ok(())
    }

    /// Other users who picked the same gym as the current user. Requires an
    /// `Active` session.
    pub fn users_at_same_gym(&mut self) -> Result<Vec<ChatUser>, CoreError> {
        let identity = match self.current_identity() {
            Some(identity) => identity,
            None => return Err(self.fail(CoreError::NotAuthenticated)),
        };

        let me = match self.fetch_profile(&identity) {
            Ok(me) => me,
            Err(e) => return Err(self.fail(e)),
        };
        let gym = match me.selected_gym {
            Some(gym) => gym,
            None => return Err(self.fail(CoreError::GymNotSelected)),
        };

        let matches = match self.backend.query_equal(
            &self.config.users_collection,
            fields::SELECTED_GYM,
            &json!(gym),
        ) {
            Ok(matches) => matches,
            Err(e) => return Err(self.fail(CoreError::Backend(e))),
        };

        Ok(matches
            .into_iter()
            .map(|(id, data)| {
                let mut user = ChatUser::from_fields(&data);
                if user.uid.is_empty() {
                    user.uid = id;
                }
                user
            })
            .filter(|user| user.uid != identity.uid)
            .collect())
    }

    /// The user on the other side of `summary`, for opening its chat.
    pub fn chat_partner(&self, summary: &ConversationSummary) -> Option<ChatUser> {
        let identity = self.identity()?;
        Some(ChatUser {
            uid: summary.counterparty_id(&identity.uid).to_string(),
            email: summary.counterparty_email.clone(),
            profile_image_url: summary.counterparty_avatar_url.clone(),
            selected_gym: None,
        })
    }

    // ===== Internals =====

    /// Identity of the active session. The backend's own identity is not
    /// consulted; it can outlive a sign-out whose backend call failed.
    fn current_identity(&self) -> Option<Identity> {
        self.identity().cloned()
    }

    fn fetch_profile(&self, identity: &Identity) -> Result<ChatUser, CoreError> {
        let data = self
            .backend
            .get_document(&self.config.users_collection, &identity.uid)
            .map_err(|e| CoreError::ProfileFetchFailed {
                message: e.to_string(),
            })?
            .ok_or(CoreError::ProfileNotFound)?;

        let mut profile = ChatUser::from_fields(&data);
        if profile.uid.is_empty() {
            profile.uid = identity.uid.clone();
        }
        Ok(profile)
    }

    fn open_all_feeds(&self, identity: &Identity) -> Result<FeedHub, CoreError> {
        let mut feeds = vec![(FeedScope::Personal, self.config.personal_feed_path(&identity.uid))];
        if let Some(shared) = &self.config.shared_feed_collection {
            feeds.push((FeedScope::Shared, shared.clone()));
        }

        // Already-opened feeds are detached by Drop if a later one fails
        let mut hub = FeedHub::new(self.stats.clone());
        for (scope, collection) in feeds {
            hub.open(
                self.backend.as_ref(),
                scope,
                &collection,
                &self.config.order_by_field,
            )?;
        }
        Ok(hub)
    }

    fn clear_summaries(&mut self) {
        if !self.store.is_empty() {
            self.store.clear();
            self.queue_summaries_changed();
        }
    }

    fn queue_summaries_changed(&mut self) {
        self.pending_events.push(CoreEvent::SummariesChanged {
            len: self.store.len(),
            front: self.store.front().map(|s| s.conversation_id.clone()),
        });
    }

    fn transition(&mut self, state: SessionState) {
        tracing::info!(from = ?self.state, to = ?state, "session state change");
        self.state = state.clone();
        self.pending_events.push(CoreEvent::StateChanged(state));
    }

    /// Record `error` as the user-visible message and hand it back.
    fn fail(&mut self, error: CoreError) -> CoreError {
        tracing::warn!(%error, "session error");
        let message = error.to_string();
        self.error_message = Some(message.clone());
        self.pending_events.push(CoreEvent::Error(message));
        error
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.feeds.close_all();
    }
}
