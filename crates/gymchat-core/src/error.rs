use crate::subscription::FeedScope;

/// Failures reported by the backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },
    #[error("Permission denied")]
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Could not find a signed-in user")]
    NotAuthenticated,
    #[error("Failed to fetch current user: {message}")]
    ProfileFetchFailed { message: String },
    #[error("No data found for current user")]
    ProfileNotFound,
    #[error("Failed to listen for recent messages ({scope}): {message}")]
    SubscriptionTransport { scope: FeedScope, message: String },
    #[error("Selected gym not found")]
    GymNotSelected,
    #[error(transparent)]
    Backend(#[from] BackendError),
}
