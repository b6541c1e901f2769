use crate::backend::{fields, RawFields};
use crate::constants::fields as keys;

use super::Gym;

/// A user's own profile document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub uid: String,
    pub email: String,
    pub profile_image_url: String,
    /// Raw `selectedGym` value; `None` until the user picks one
    pub selected_gym: Option<i64>,
}

impl ChatUser {
    pub fn from_fields(data: &RawFields) -> Self {
        Self {
            uid: fields::string_or_default(data, keys::UID),
            email: fields::string_or_default(data, keys::EMAIL),
            profile_image_url: fields::string_or_default(data, keys::PROFILE_IMAGE_URL),
            selected_gym: fields::integer(data, keys::SELECTED_GYM),
        }
    }

    pub fn gym(&self) -> Option<Gym> {
        self.selected_gym.and_then(Gym::from_id)
    }

    /// Name shown in the header: the email with a trailing `@gmail.com` dropped.
    pub fn header_name(&self) -> String {
        self.email.replace("@gmail.com", "")
    }
}
