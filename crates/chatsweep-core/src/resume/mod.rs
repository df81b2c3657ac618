//! Resumable operation checkpoints.
//!
//! A single durable slot describing the most recently interrupted operation
//! sequence (a scan, a group send or a direct send), so it can be continued
//! after a client restart.

mod model;
mod repository;

pub use model::{OperationKind, ResumeSnapshot, SnapshotStatus};
pub use repository::ResumeStore;
