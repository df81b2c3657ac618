//! Wire types for the remote services.
//!
//! Status and delete payloads use `camelCase` keys; stream events use
//! `snake_case` and are tagged by a `type` field.

mod connect;
mod delete;
mod identifiers;
mod scan;

pub use connect::ConnectOutcome;
pub use delete::{
    ChatDeleteResult, DeleteAllResponse, DeleteResponse, MessageDeleteResult, VerifyResponse,
};
pub use identifiers::{AccountId, ChatId, MessageId};
pub use scan::{Ack, RemoteChatStatus, RemotePhase, ScanEvent, ScanOptions, ScanStatus, ScannedChat};
