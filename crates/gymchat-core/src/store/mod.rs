pub mod summary_store;

pub use summary_store::{ObserverId, StoreChange, SummaryStore};
