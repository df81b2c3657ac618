//! Delete batch results.

use serde::{Deserialize, Serialize};

use crate::{ChatId, MessageId};

/// Final classification of one message in a delete batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteItemStatus {
    /// Verification confirmed the message is gone.
    Deleted,
    /// The delete or its verification failed, retries included.
    Failed,
    /// The service reported the delete, but verification found the message.
    StillExists,
}

/// Outcome for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteItem {
    /// Chat holding the message.
    pub chat_id: ChatId,
    /// Message identifier.
    pub message_id: MessageId,
    /// Classification.
    pub status: DeleteItemStatus,
    /// Failure description for [`DeleteItemStatus::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteItem {
    pub(crate) const fn new(chat_id: ChatId, message_id: MessageId, status: DeleteItemStatus) -> Self {
        Self {
            chat_id,
            message_id,
            status,
            error: None,
        }
    }

    pub(crate) fn failed(chat_id: ChatId, message_id: MessageId, error: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            status: DeleteItemStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Outcome of one delete and verify cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBatchResult {
    /// Per-message outcomes, in request order.
    pub items: Vec<DeleteItem>,
    /// Messages confirmed deleted.
    pub total_deleted: usize,
    /// Messages not deleted, whatever the reason.
    pub total_failed: usize,
}

impl DeleteBatchResult {
    /// Builds a result, deriving the totals.
    #[must_use]
    pub fn from_items(items: Vec<DeleteItem>) -> Self {
        let total_deleted = items
            .iter()
            .filter(|item| item.status == DeleteItemStatus::Deleted)
            .count();
        Self {
            total_failed: items.len() - total_deleted,
            total_deleted,
            items,
        }
    }

    /// Ids with the given status.
    #[must_use]
    pub fn ids_with(&self, status: DeleteItemStatus) -> Vec<MessageId> {
        self.items
            .iter()
            .filter(|item| item.status == status)
            .map(|item| item.message_id)
            .collect()
    }

    /// Ids confirmed deleted.
    #[must_use]
    pub fn deleted(&self) -> Vec<MessageId> {
        self.ids_with(DeleteItemStatus::Deleted)
    }

    /// Ids the service claimed to delete that verification still found.
    #[must_use]
    pub fn discrepancies(&self) -> Vec<MessageId> {
        self.ids_with(DeleteItemStatus::StillExists)
    }

    /// Ids that failed after the retry.
    #[must_use]
    pub fn failures(&self) -> Vec<MessageId> {
        self.ids_with(DeleteItemStatus::Failed)
    }
}

/// Aggregate of deletes across chats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllSummary {
    /// Per-chat results, in processing order.
    pub chats: Vec<(ChatId, DeleteBatchResult)>,
    /// Messages confirmed deleted.
    pub total_deleted: usize,
    /// Messages not deleted, including failures the service only counted.
    pub total_failed: usize,
}

impl DeleteAllSummary {
    pub(crate) fn push(&mut self, chat_id: ChatId, result: DeleteBatchResult) {
        self.total_deleted += result.total_deleted;
        self.total_failed += result.total_failed;
        self.chats.push((chat_id, result));
    }

    /// Every discrepancy across chats.
    #[must_use]
    pub fn discrepancies(&self) -> Vec<(ChatId, MessageId)> {
        self.chats
            .iter()
            .flat_map(|(chat_id, result)| {
                result
                    .discrepancies()
                    .into_iter()
                    .map(move |message_id| (*chat_id, message_id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_count_everything_not_deleted() {
        let chat = ChatId(1);
        let result = DeleteBatchResult::from_items(vec![
            DeleteItem::new(chat, MessageId(1), DeleteItemStatus::Deleted),
            DeleteItem::new(chat, MessageId(2), DeleteItemStatus::StillExists),
            DeleteItem::failed(chat, MessageId(3), "timeout"),
        ]);
        assert_eq!(result.total_deleted, 1);
        assert_eq!(result.total_failed, 2);
        assert_eq!(result.discrepancies(), vec![MessageId(2)]);
        assert_eq!(result.failures(), vec![MessageId(3)]);
    }

    #[test]
    fn test_summary_aggregates() {
        let mut summary = DeleteAllSummary::default();
        summary.push(
            ChatId(1),
            DeleteBatchResult::from_items(vec![DeleteItem::new(
                ChatId(1),
                MessageId(1),
                DeleteItemStatus::StillExists,
            )]),
        );
        summary.push(
            ChatId(2),
            DeleteBatchResult::from_items(vec![DeleteItem::new(
                ChatId(2),
                MessageId(5),
                DeleteItemStatus::Deleted,
            )]),
        );
        assert_eq!(summary.total_deleted, 1);
        assert_eq!(summary.total_failed, 1);
        assert_eq!(summary.discrepancies(), vec![(ChatId(1), MessageId(1))]);
    }
}
