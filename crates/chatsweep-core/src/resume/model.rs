//! Resume checkpoint models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Kind of interruptible operation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A scan job.
    Scan,
    /// A message sent to a list of groups.
    GroupSend,
    /// A message sent to a list of direct contacts.
    DirectSend,
}

impl OperationKind {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scan" => Some(Self::Scan),
            "group_send" => Some(Self::GroupSend),
            "direct_send" => Some(Self::DirectSend),
            _ => None,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::GroupSend => "group_send",
            Self::DirectSend => "direct_send",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the checkpointed sequence still has work left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    /// Interrupted or in flight; resumable.
    #[default]
    Pending,
    /// Every step ran.
    Completed,
}

impl SnapshotStatus {
    /// Parse from database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

/// A persisted checkpoint of an interruptible operation sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSnapshot {
    /// Snapshot identifier; for scans this is also the job id.
    pub id: String,
    /// Kind of sequence.
    pub kind: OperationKind,
    /// Account the sequence runs on.
    pub account_id: AccountId,
    /// Human-readable description.
    pub description: String,
    /// Ordered human-readable step descriptors.
    pub operations: Vec<String>,
    /// Number of leading steps already done.
    pub completed_steps: usize,
    /// When the sequence started.
    pub started_at: DateTime<Utc>,
    /// Sequence status.
    pub status: SnapshotStatus,
}

impl ResumeSnapshot {
    /// Creates a pending snapshot with a fresh id.
    #[must_use]
    pub fn new(
        kind: OperationKind,
        account_id: AccountId,
        description: impl Into<String>,
        operations: Vec<String>,
    ) -> Self {
        let started_at = Utc::now();
        let id = format!(
            "{kind}-{account_id}-{}-{:08x}",
            started_at.timestamp_millis(),
            rand::random::<u32>()
        );
        Self {
            id,
            kind,
            account_id,
            description: description.into(),
            operations,
            completed_steps: 0,
            started_at,
            status: SnapshotStatus::Pending,
        }
    }

    /// Returns true if this snapshot can be resumed for the given account and kind.
    #[must_use]
    pub fn is_resumable_for(&self, account_id: &AccountId, kind: OperationKind) -> bool {
        self.status == SnapshotStatus::Pending && self.kind == kind && &self.account_id == account_id
    }

    /// Steps that have not run yet.
    #[must_use]
    pub fn remaining_operations(&self) -> &[String] {
        self.operations
            .get(self.completed_steps..)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_strings() {
        for kind in [
            OperationKind::Scan,
            OperationKind::GroupSend,
            OperationKind::DirectSend,
        ] {
            assert_eq!(OperationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OperationKind::parse("backup"), None);
    }

    #[test]
    fn test_resumable_for() {
        let snapshot = ResumeSnapshot::new(
            OperationKind::Scan,
            AccountId::new("a"),
            "Scan of a",
            vec!["start".to_string()],
        );
        assert!(snapshot.is_resumable_for(&AccountId::new("a"), OperationKind::Scan));
        assert!(!snapshot.is_resumable_for(&AccountId::new("b"), OperationKind::Scan));
        assert!(!snapshot.is_resumable_for(&AccountId::new("a"), OperationKind::GroupSend));
    }

    #[test]
    fn test_remaining_operations() {
        let mut snapshot = ResumeSnapshot::new(
            OperationKind::GroupSend,
            AccountId::new("a"),
            "Send to 3 groups",
            vec!["g1".to_string(), "g2".to_string(), "g3".to_string()],
        );
        snapshot.completed_steps = 2;
        assert_eq!(snapshot.remaining_operations(), ["g3".to_string()]);
        snapshot.completed_steps = 9;
        assert!(snapshot.remaining_operations().is_empty());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ResumeSnapshot::new(OperationKind::Scan, AccountId::new("a"), "", Vec::new());
        let b = ResumeSnapshot::new(OperationKind::Scan, AccountId::new("a"), "", Vec::new());
        assert_ne!(a.id, b.id);
    }
}
