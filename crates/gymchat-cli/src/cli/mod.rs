pub mod config;
pub mod replay;
pub mod script;

pub use config::{default_config_path, resolve_config};
pub use replay::{render_summaries, run_replay, ReplayReport};
pub use script::{FeedRef, Script, Step};
