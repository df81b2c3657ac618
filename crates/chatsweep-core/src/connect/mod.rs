//! Bulk account connect.

mod model;
mod sequencer;

pub use model::{BulkConnectState, ConnectReport, ConnectRequest, InputKind};
pub use sequencer::{BulkConnectSequencer, ConnectHandle};
