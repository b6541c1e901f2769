use chrono::{DateTime, Utc};

use crate::backend::{fields, RawFields};
use crate::constants::fields as keys;

/// Latest-message metadata for one peer conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    /// Backend document id, stable per conversation
    pub conversation_id: String,
    pub last_message_text: String,
    pub counterparty_email: String,
    /// Empty when the counterparty has no avatar
    pub counterparty_avatar_url: String,
    pub participant_from_id: String,
    pub participant_to_id: String,
    pub last_message_timestamp: DateTime<Utc>,
}

impl ConversationSummary {
    /// Decode a summary document. Never fails; see [`Self::from_fields_at`].
    pub fn from_fields(conversation_id: &str, data: &RawFields) -> Self {
        Self::from_fields_at(conversation_id, data, Utc::now())
    }

    /// Decode with an explicit decode time. Missing or mistyped strings become
    /// empty and a missing timestamp becomes `decoded_at`.
    pub fn from_fields_at(
        conversation_id: &str,
        data: &RawFields,
        decoded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            last_message_text: fields::string_or_default(data, keys::TEXT),
            counterparty_email: fields::string_or_default(data, keys::EMAIL),
            counterparty_avatar_url: fields::string_or_default(data, keys::PROFILE_IMAGE_URL),
            participant_from_id: fields::string_or_default(data, keys::FROM_ID),
            participant_to_id: fields::string_or_default(data, keys::TO_ID),
            last_message_timestamp: fields::timestamp_or(data, keys::TIMESTAMP, decoded_at),
        }
    }

    /// Email up to the first `@`.
    pub fn display_name(&self) -> &str {
        self.counterparty_email
            .split('@')
            .next()
            .unwrap_or(&self.counterparty_email)
    }

    /// The participant that is not `current_uid`.
    pub fn counterparty_id(&self, current_uid: &str) -> &str {
        if self.participant_from_id == current_uid {
            &self.participant_to_id
        } else {
            &self.participant_from_id
        }
    }

    pub fn time_ago(&self, now: DateTime<Utc>) -> String {
        relative_time(self.last_message_timestamp, now)
    }
}

/// Abbreviated relative time, e.g. "5 min. ago" or "in 2 hr.".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then).num_seconds();
    let secs = delta.unsigned_abs();
    if secs == 0 {
        return "now".to_string();
    }

    let unit = match secs {
        s if s < 60 => format!("{} sec.", s),
        s if s < 3_600 => format!("{} min.", s / 60),
        s if s < 86_400 => format!("{} hr.", s / 3_600),
        s if s < 7 * 86_400 => {
            let days = s / 86_400;
            if days == 1 {
                "1 day".to_string()
            } else {
                format!("{} days", days)
            }
        }
        s if s < 30 * 86_400 => format!("{} wk.", s / (7 * 86_400)),
        s if s < 365 * 86_400 => format!("{} mo.", s / (30 * 86_400)),
        s => format!("{} yr.", s / (365 * 86_400)),
    };

    if delta < 0 {
        format!("in {}", unit)
    } else {
        format!("{} ago", unit)
    }
}
