use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gymchat_core::backend::fields;
use gymchat_core::constants::fields as keys;
use gymchat_core::{CoreConfig, Identity, RawFields};

/// Which feed a script step writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedRef {
    Personal,
    Shared,
}

/// A scripted session: seed documents, then a sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub identity: Identity,
    /// Profile documents keyed by uid
    #[serde(default)]
    pub users: BTreeMap<String, RawFields>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Create or overwrite a summary document
    #[serde(rename_all = "camelCase")]
    Set {
        feed: FeedRef,
        id: String,
        #[serde(default)]
        fields: RawFields,
        /// Sets `timestamp` to this many seconds before now
        #[serde(default, skip_serializing_if = "Option::is_none")]
        age_secs: Option<i64>,
    },
    Delete {
        feed: FeedRef,
        id: String,
    },
    FeedError {
        feed: FeedRef,
        message: String,
    },
    Sleep {
        ms: u64,
    },
    Reopen,
    SignOut,
    SignIn,
    UpdateGym {
        gym: i64,
    },
    ListGymMates,
}

impl Script {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script: {}", path.display()))
    }
}

impl FeedRef {
    /// Collection path for this feed, or `None` if the shared feed is disabled.
    pub fn collection(self, config: &CoreConfig, uid: &str) -> Option<String> {
        match self {
            FeedRef::Personal => Some(config.personal_feed_path(uid)),
            FeedRef::Shared => config.shared_feed_collection.clone(),
        }
    }
}

/// Document body for a `set` step, with `ageSecs` resolved against `now`.
pub fn document_fields(fields: &RawFields, age_secs: Option<i64>, now: DateTime<Utc>) -> RawFields {
    let mut doc = fields.clone();
    if let Some(age) = age_secs {
        doc.insert(
            keys::TIMESTAMP.to_string(),
            fields::timestamp_value(now - Duration::seconds(age)),
        );
    }
    doc
}
