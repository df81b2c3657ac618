//! Scan service wire types.

use serde::{Deserialize, Serialize};

use super::{ChatId, MessageId};
use crate::{Error, Result};

/// Options sent with a start-scan command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOptions {
    /// Keywords the service matches messages against.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Also scan one-to-one conversations, not only groups.
    #[serde(default)]
    pub include_private_chats: bool,
    /// Only consider messages newer than this many days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since_days: Option<u32>,
    /// Upper bound on chats to scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_chats: Option<u32>,
}

/// Acknowledgement returned by every scan command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the command was accepted.
    pub success: bool,
    /// Optional server message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Ack {
    /// An accepting acknowledgement.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    /// Converts a refusal into [`Error::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the server did not accept the command.
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::Rejected(
                self.message.unwrap_or_else(|| "command refused".to_string()),
            ))
        }
    }
}

/// Job phase as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePhase {
    /// No job is running.
    #[default]
    Idle,
    /// Chats are being discovered.
    Discovering,
    /// Chats are being scanned.
    Scanning,
    /// Job is paused server-side.
    Paused,
    /// Job is being stopped.
    Stopping,
    /// Job finished.
    Completed,
    /// Job failed.
    Error,
    /// A phase this client does not know.
    #[serde(other)]
    Unknown,
}

impl RemotePhase {
    /// Returns true if the remote job is no longer running.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Error)
    }
}

/// Per-chat status as reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChatStatus {
    /// Discovered, not yet scanned.
    #[default]
    Pending,
    /// Currently being scanned.
    Scanning,
    /// Scan finished.
    Completed,
    /// Chat was skipped.
    Skipped,
    /// Scan of this chat failed.
    Error,
    /// A status this client does not know.
    #[serde(other)]
    Unknown,
}

/// One chat entry inside a status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedChat {
    /// Chat identifier.
    pub id: ChatId,
    /// Chat title.
    #[serde(default)]
    pub title: String,
    /// Chat status.
    #[serde(default)]
    pub status: RemoteChatStatus,
    /// Number of matching messages found so far.
    #[serde(default)]
    pub messages_found: u64,
    /// Scan progress, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    /// Number of chat members.
    #[serde(default)]
    pub member_count: u32,
    /// Error or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Status snapshot returned by the scan-status poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    /// Current job phase.
    #[serde(default)]
    pub phase: RemotePhase,
    /// Title of the chat being scanned right now.
    #[serde(default)]
    pub current_chat: Option<String>,
    /// Index of the chat being scanned.
    #[serde(default)]
    pub current_index: u32,
    /// Number of chats in the job.
    #[serde(default)]
    pub total_chats: u32,
    /// Every chat the service knows about.
    #[serde(default)]
    pub scanned_chats: Vec<ScannedChat>,
}

/// Event pushed on the per-account scan stream.
///
/// Events arrive in order; `ScanComplete`, `ScanIdle` and `Error` end a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A chat was discovered.
    GroupDiscovered {
        /// Chat identifier.
        chat_id: ChatId,
        /// Chat title.
        #[serde(default)]
        title: String,
        /// Number of members.
        #[serde(default)]
        member_count: u32,
    },
    /// Discovery finished.
    #[serde(rename = "phase1_complete")]
    Phase1Complete {
        /// Number of chats discovered.
        #[serde(default)]
        total_chats: u32,
    },
    /// Deep scan started.
    #[serde(rename = "phase2_start")]
    Phase2Start {
        /// Number of chats that will be scanned.
        #[serde(default)]
        total_chats: u32,
    },
    /// A chat is being scanned.
    ChatScanning {
        /// Chat identifier.
        chat_id: ChatId,
        /// Chat title, if the service repeats it.
        #[serde(default)]
        title: Option<String>,
        /// Progress, 0 to 100.
        #[serde(default)]
        progress: u8,
    },
    /// A matching message was found.
    MessageFound {
        /// Chat identifier.
        chat_id: ChatId,
        /// Message identifier.
        message_id: MessageId,
    },
    /// A chat finished scanning.
    ChatCompleted {
        /// Chat identifier.
        chat_id: ChatId,
        /// Final number of matching messages.
        #[serde(default)]
        messages_found: u64,
    },
    /// A chat was skipped.
    ChatSkipped {
        /// Chat identifier.
        chat_id: ChatId,
        /// Why it was skipped.
        #[serde(default)]
        reason: Option<String>,
    },
    /// Scanning a chat failed.
    ChatError {
        /// Chat identifier.
        chat_id: ChatId,
        /// Failure description.
        #[serde(default)]
        error: String,
    },
    /// The job completed.
    ScanComplete {
        /// Total matching messages across the job.
        #[serde(default)]
        total_messages_found: u64,
    },
    /// The service has no running job.
    ScanIdle,
    /// The job failed.
    Error {
        /// Failure description.
        #[serde(default)]
        message: String,
    },
}

impl ScanEvent {
    /// Returns the chat this event refers to, if any.
    #[must_use]
    pub const fn chat_id(&self) -> Option<ChatId> {
        match self {
            Self::GroupDiscovered { chat_id, .. }
            | Self::ChatScanning { chat_id, .. }
            | Self::MessageFound { chat_id, .. }
            | Self::ChatCompleted { chat_id, .. }
            | Self::ChatSkipped { chat_id, .. }
            | Self::ChatError { chat_id, .. } => Some(*chat_id),
            Self::Phase1Complete { .. }
            | Self::Phase2Start { .. }
            | Self::ScanComplete { .. }
            | Self::ScanIdle
            | Self::Error { .. } => None,
        }
    }

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GroupDiscovered { .. } => "group_discovered",
            Self::Phase1Complete { .. } => "phase1_complete",
            Self::Phase2Start { .. } => "phase2_start",
            Self::ChatScanning { .. } => "chat_scanning",
            Self::MessageFound { .. } => "message_found",
            Self::ChatCompleted { .. } => "chat_completed",
            Self::ChatSkipped { .. } => "chat_skipped",
            Self::ChatError { .. } => "chat_error",
            Self::ScanComplete { .. } => "scan_complete",
            Self::ScanIdle => "scan_idle",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"group_discovered","chat_id":12,"title":"Team","member_count":40}"#;
        let event: ScanEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ScanEvent::GroupDiscovered {
                chat_id: ChatId(12),
                title: "Team".to_string(),
                member_count: 40,
            }
        );

        let event: ScanEvent = serde_json::from_str(r#"{"type":"phase1_complete"}"#).unwrap();
        assert_eq!(event, ScanEvent::Phase1Complete { total_chats: 0 });

        let event: ScanEvent = serde_json::from_str(r#"{"type":"scan_idle"}"#).unwrap();
        assert_eq!(event.name(), "scan_idle");
        assert_eq!(event.chat_id(), None);
    }

    #[test]
    fn test_status_snapshot_defaults() {
        let json = r#"{
            "phase": "scanning",
            "currentChat": "Team",
            "currentIndex": 2,
            "totalChats": 3,
            "scannedChats": [{"id": 1, "title": "A", "status": "completed", "messagesFound": 4, "progress": 100}]
        }"#;
        let status: ScanStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.phase, RemotePhase::Scanning);
        assert_eq!(status.scanned_chats.len(), 1);
        assert_eq!(status.scanned_chats[0].status, RemoteChatStatus::Completed);
        assert_eq!(status.scanned_chats[0].member_count, 0);
    }

    #[test]
    fn test_unknown_phase_is_tolerated() {
        let status: ScanStatus = serde_json::from_str(r#"{"phase":"warming_up"}"#).unwrap();
        assert_eq!(status.phase, RemotePhase::Unknown);
        assert!(!status.phase.is_finished());
    }

    #[test]
    fn test_ack_rejection() {
        let ack = Ack {
            success: false,
            message: Some("already running".to_string()),
        };
        let err = ack.into_result().unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert!(Ack::ok().into_result().is_ok());
    }
}
