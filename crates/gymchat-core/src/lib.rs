pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod session;
pub mod stats;
pub mod store;
pub mod subscription;
pub mod tracing_setup;

// Re-export the types most callers need at crate root for convenience
pub use backend::{Backend, ChangeEvent, ChangeKind, FeedId, Identity, InMemoryBackend, RawFields};
pub use config::{CoreConfig, RemovalPolicy};
pub use error::{BackendError, CoreError};
pub use events::CoreEvent;
pub use models::{ChatUser, ConversationSummary, Gym};
pub use session::{SessionController, SessionState};
pub use store::SummaryStore;
pub use subscription::{ChangeStreamSubscription, FeedHub, FeedScope};
