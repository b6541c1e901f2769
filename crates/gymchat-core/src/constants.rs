//! Collection and field names shared by the backend layout
//!
//! Centralized location for the document paths and field keys that
//! the models and the session controller both depend on.

/// Collection holding one profile document per user, keyed by uid
pub const USERS_COLLECTION: &str = "users";

/// Root collection of per-user recent-message summaries
pub const RECENT_MESSAGES_COLLECTION: &str = "recent_messages";

/// Sub-collection under `recent_messages/{uid}` holding one summary per conversation
pub const MESSAGES_SUBCOLLECTION: &str = "messages";

/// Collection carrying recent messages visible to every signed-in user
pub const SHARED_RECENT_MESSAGES_COLLECTION: &str = "all_recent_messages";

// Summary document fields
pub mod fields {
    pub const TEXT: &str = "text";
    pub const EMAIL: &str = "email";
    pub const FROM_ID: &str = "fromId";
    pub const TO_ID: &str = "toId";
    pub const PROFILE_IMAGE_URL: &str = "profileImageUrl";
    pub const TIMESTAMP: &str = "timestamp";

    // Profile document fields
    pub const UID: &str = "uid";
    pub const SELECTED_GYM: &str = "selectedGym";
}

/// Environment variable that enables the extra debug log file
pub const LOG_FILE_ENV: &str = "GYMCHAT_LOG_FILE";
