use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    fields, MESSAGES_SUBCOLLECTION, RECENT_MESSAGES_COLLECTION, SHARED_RECENT_MESSAGES_COLLECTION,
    USERS_COLLECTION,
};

/// What a `Removed` change does to the conversation list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalPolicy {
    /// Drop the conversation from the list
    #[default]
    Delete,
    /// Keep showing the last known summary
    Ignore,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Backend layout and reconciliation settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub users_collection: String,
    pub recent_messages_collection: String,
    pub messages_subcollection: String,
    pub order_by_field: String,
    /// Second feed merged into the same list; `null` disables it
    pub shared_feed_collection: Option<String>,
    pub removal_policy: RemovalPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            users_collection: USERS_COLLECTION.to_string(),
            recent_messages_collection: RECENT_MESSAGES_COLLECTION.to_string(),
            messages_subcollection: MESSAGES_SUBCOLLECTION.to_string(),
            order_by_field: fields::TIMESTAMP.to_string(),
            shared_feed_collection: Some(SHARED_RECENT_MESSAGES_COLLECTION.to_string()),
            removal_policy: RemovalPolicy::default(),
        }
    }
}

impl CoreConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `recent_messages/{uid}/messages`
    pub fn personal_feed_path(&self, uid: &str) -> String {
        format!(
            "{}/{}/{}",
            self.recent_messages_collection, uid, self.messages_subcollection
        )
    }
}
