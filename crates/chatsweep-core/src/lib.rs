//! # chatsweep-core
//!
//! Scan orchestration and resume engine for a remote chat-scanning service.
//!
//! This crate provides:
//! - **Scan sessions** - per-account job state machine with stream reconnect
//!   and poll-only fallback
//! - **Progress reconciliation** - one chat table from push events and polls
//! - **Resume checkpoints** - a single durable slot for interrupted sequences
//! - **Verified deletes** - delete requests gated on a verification pass
//! - **Bulk connect** - sequential account connects with code/password prompts
//! - **Local storage** (`SQLite`) for checkpoints and cached scan tables
//!
//! Remote services are consumed through the traits in [`chatsweep_remote`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod connect;
pub mod delete;
mod error;
pub mod resume;
mod retry;
pub mod scan;

pub use chatsweep_remote::{AccountId, ChatId, MessageId};
pub use config::{ConnectConfig, DeleteConfig, EngineConfig, SessionConfig};
pub use connect::{
    BulkConnectSequencer, BulkConnectState, ConnectHandle, ConnectReport, ConnectRequest,
    InputKind,
};
pub use delete::{
    BatchDeleteCoordinator, DeleteAllSummary, DeleteBatchResult, DeleteItem, DeleteItemStatus,
};
pub use error::{Error, Result};
pub use resume::{OperationKind, ResumeSnapshot, ResumeStore, SnapshotStatus};
pub use scan::{
    ActiveScanGuard, ActiveScans, ChatScanRecord, ChatStatus, ChatTable, FoundMessages,
    ProgressReconciler, ScanJobState, ScanPhase, ScanSession, ScanStateCache, ScanStats,
    SessionStores, SessionUpdate,
};
