//! Verified batch deletes of found messages.

mod coordinator;
mod model;

pub use coordinator::BatchDeleteCoordinator;
pub use model::{DeleteAllSummary, DeleteBatchResult, DeleteItem, DeleteItemStatus};
