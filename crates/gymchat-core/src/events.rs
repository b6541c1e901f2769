use crate::models::ChatUser;
use crate::session::SessionState;
use crate::subscription::FeedScope;

/// Notifications for the UI collaborator, returned by the session controller.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    StateChanged(SessionState),
    ProfileLoaded(ChatUser),
    /// The ordered conversation list changed
    SummariesChanged {
        len: usize,
        front: Option<String>,
    },
    /// A feed failed and was detached; it stays down until reopened
    FeedError { scope: FeedScope, message: String },
    /// A user-visible error message
    Error(String),
}
