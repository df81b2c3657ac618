//! Delete service wire types.

use serde::{Deserialize, Serialize};

use super::{ChatId, MessageId};

/// Result for a single message in a delete response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleteResult {
    /// Message identifier.
    pub message_id: MessageId,
    /// Whether the service reports the delete as done.
    pub success: bool,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to a delete-messages request.
///
/// A successful entry only means the service *attempted* the delete; it is
/// not proof that the message is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    /// Number of messages the service reports as deleted.
    #[serde(default)]
    pub deleted_count: u32,
    /// Number of messages the service reports as failed.
    #[serde(default)]
    pub failed_count: u32,
    /// Per-message results.
    #[serde(default)]
    pub results: Vec<MessageDeleteResult>,
}

impl DeleteResponse {
    /// Splits the requested ids into reported successes and failures.
    ///
    /// Ids the response does not mention are counted as failed.
    #[must_use]
    pub fn partition(&self, requested: &[MessageId]) -> (Vec<MessageId>, Vec<MessageId>) {
        requested.iter().copied().partition(|id| {
            self.results
                .iter()
                .any(|r| r.message_id == *id && r.success)
        })
    }
}

/// Response to a verify-deletion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Ids confirmed gone.
    #[serde(default)]
    pub actually_deleted: Vec<MessageId>,
    /// Ids that are still present.
    #[serde(default)]
    pub still_exist: Vec<MessageId>,
}

/// Per-chat entry of a delete-all-found-messages response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleteResult {
    /// Chat identifier.
    pub chat_id: ChatId,
    /// Number of messages the service deleted.
    #[serde(default)]
    pub deleted_count: u32,
    /// Ids the service deleted, when it reports them.
    #[serde(default)]
    pub deleted_message_ids: Vec<MessageId>,
    /// Number of messages the service failed to delete.
    #[serde(default)]
    pub failed_count: u32,
}

/// Response to a delete-all-found-messages request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllResponse {
    /// Total messages the service deleted.
    #[serde(default)]
    pub total_deleted: u32,
    /// Per-chat breakdown.
    #[serde(default)]
    pub chat_results: Vec<ChatDeleteResult>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_treats_missing_as_failed() {
        let response = DeleteResponse {
            deleted_count: 1,
            failed_count: 1,
            results: vec![
                MessageDeleteResult {
                    message_id: MessageId(1),
                    success: true,
                    error: None,
                },
                MessageDeleteResult {
                    message_id: MessageId(2),
                    success: false,
                    error: Some("FLOOD_WAIT".to_string()),
                },
            ],
        };

        let (ok, failed) = response.partition(&[MessageId(1), MessageId(2), MessageId(3)]);
        assert_eq!(ok, vec![MessageId(1)]);
        assert_eq!(failed, vec![MessageId(2), MessageId(3)]);
    }

    #[test]
    fn test_verify_response_deserialization() {
        let json = r#"{"actuallyDeleted":[1,2],"stillExist":[3]}"#;
        let response: VerifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.actually_deleted, vec![MessageId(1), MessageId(2)]);
        assert_eq!(response.still_exist, vec![MessageId(3)]);
    }
}
