//! Scan jobs.
//!
//! This module provides:
//! - Chat table models and aggregate stats
//! - The progress reconciler that merges stream events with status polls
//! - The per-account scan session state machine
//! - A SQLite cache of chat tables and the active job registry

mod cache;
mod model;
mod reconciler;
mod registry;
mod session;

pub use cache::ScanStateCache;
pub use model::{
    ChatScanRecord, ChatStatus, ChatTable, FoundMessages, ScanJobState, ScanPhase, ScanStats,
};
pub use reconciler::ProgressReconciler;
pub use registry::{ActiveScanGuard, ActiveScans};
pub use session::{ScanSession, SessionStores, SessionUpdate};
