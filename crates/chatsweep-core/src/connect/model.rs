//! Bulk connect models.

use serde::{Deserialize, Serialize};

use crate::AccountId;

/// One account to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Account identifier.
    pub account_id: AccountId,
    /// Display label used in reports.
    pub label: String,
}

impl ConnectRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(account_id: impl Into<AccountId>, label: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            label: label.into(),
        }
    }
}

/// Out-of-band input an attempt is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputKind {
    /// A verification code.
    Code,
    /// A two-factor password.
    Password {
        /// Password hint, if the account has one.
        hint: Option<String>,
    },
}

/// Progress of a bulk connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConnectState {
    /// Whether a sequence is running.
    pub active: bool,
    /// Accounts in the sequence.
    pub total: usize,
    /// Attempts finished, successful or not.
    pub completed: usize,
    /// Account being connected; set only while active.
    pub current_account_id: Option<AccountId>,
    /// Input the current attempt is suspended on.
    pub awaiting: Option<InputKind>,
}

/// Outcome of a bulk connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReport {
    /// Accounts connected.
    pub succeeded: usize,
    /// Labels of accounts that failed.
    pub failed_labels: Vec<String>,
    /// Labels of accounts skipped after the failure.
    pub not_attempted: Vec<String>,
}

impl ConnectReport {
    /// Returns true if every account connected.
    #[must_use]
    pub fn all_connected(&self) -> bool {
        self.failed_labels.is_empty() && self.not_attempted.is_empty()
    }
}
