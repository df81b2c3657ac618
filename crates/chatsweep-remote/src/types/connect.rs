//! Account connect wire types.

use serde::{Deserialize, Serialize};

/// Outcome of a connect, submit-code or submit-password call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// The account is connected.
    Connected,
    /// A verification code was sent out of band and must be entered.
    CodeRequired,
    /// A two-factor password must be entered.
    PasswordRequired {
        /// Password hint configured by the user.
        #[serde(default)]
        hint: Option<String>,
    },
    /// The attempt failed.
    Failed {
        /// Failure description.
        #[serde(default)]
        reason: String,
    },
}
