pub mod gym;
pub mod summary;
pub mod user;

pub use gym::Gym;
pub use summary::{relative_time, ConversationSummary};
pub use user::ChatUser;
