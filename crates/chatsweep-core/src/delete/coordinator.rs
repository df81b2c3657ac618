//! Delete requests with a verification pass.
//!
//! A delete response only says what the service attempted. Counts in the chat
//! table move only for ids a separate verification request confirms gone.

use std::collections::HashSet;

use chatsweep_remote::DeleteService;
use tracing::{debug, info, warn};

use super::model::{DeleteAllSummary, DeleteBatchResult, DeleteItem, DeleteItemStatus};
use crate::config::DeleteConfig;
use crate::retry::{jitter, retry_once, with_timeout};
use crate::scan::{ChatStatus, ScanJobState};
use crate::{AccountId, ChatId, Error, MessageId, Result};

/// Runs delete and verify cycles against a chat table.
#[derive(Debug)]
pub struct BatchDeleteCoordinator<D: DeleteService> {
    service: D,
    config: DeleteConfig,
}

impl<D: DeleteService> BatchDeleteCoordinator<D> {
    /// Creates a coordinator.
    #[must_use]
    pub const fn new(service: D, config: DeleteConfig) -> Self {
        Self { service, config }
    }

    /// Deletes messages of one chat and verifies the result.
    ///
    /// The chat is marked deleting for the duration and its status restored
    /// afterwards. Only verified ids move from `messages_found` to
    /// `messages_deleted`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChat`] if the chat is not in the table. Remote
    /// failures are reported per message in the result.
    pub async fn delete_and_verify(
        &self,
        state: &mut ScanJobState,
        chat_id: ChatId,
        message_ids: &[MessageId],
    ) -> Result<DeleteBatchResult> {
        let record = state
            .chats
            .get_mut(chat_id)
            .ok_or(Error::UnknownChat(chat_id))?;
        let previous = record.status;
        record.status = ChatStatus::Deleting;
        state.recompute_stats();

        let ids = dedup(message_ids);
        info!(chat = %chat_id, count = ids.len(), "Deleting messages");
        let items = self.run(chat_id, &ids, false).await;
        Ok(apply(state, chat_id, previous, items))
    }

    /// Deletes every found message, chat by chat.
    ///
    /// Chats whose found count came from polls alone have no message ids and
    /// are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error only for chats missing from the table.
    pub async fn delete_all(&self, state: &mut ScanJobState) -> Result<DeleteAllSummary> {
        let targets: Vec<(ChatId, Vec<MessageId>)> = state
            .chats_with_messages()
            .filter(|chat| {
                if chat.found_messages.is_empty() {
                    debug!(chat = %chat.id, "No message ids known, skipping");
                }
                !chat.found_messages.is_empty()
            })
            .map(|chat| (chat.id, chat.found_messages.to_vec()))
            .collect();

        let mut summary = DeleteAllSummary::default();
        for (chat_id, ids) in targets {
            let result = self.delete_and_verify(state, chat_id, &ids).await?;
            summary.push(chat_id, result);
        }

        info!(
            chats = summary.chats.len(),
            deleted = summary.total_deleted,
            failed = summary.total_failed,
            "Delete all finished"
        );
        Ok(summary)
    }

    /// Asks the service to delete every found message of the account, then
    /// verifies each chat's reported ids before touching the table.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the delete-all request fails twice.
    pub async fn delete_all_server_side(
        &self,
        state: &mut ScanJobState,
        account_id: &AccountId,
    ) -> Result<DeleteAllSummary> {
        let service = &self.service;
        let response = retry_once(
            "delete_all_found_messages",
            self.config.request_timeout,
            self.retry_delay(),
            move || service.delete_all_found_messages(account_id),
        )
        .await?;
        info!(
            account = %account_id,
            reported = response.total_deleted,
            chats = response.chat_results.len(),
            "Server-side delete finished, verifying"
        );

        let mut summary = DeleteAllSummary::default();
        for chat_result in response.chat_results {
            let chat_id = chat_result.chat_id;
            summary.total_failed += usize::try_from(chat_result.failed_count).unwrap_or(usize::MAX);

            let Some(record) = state.chats.get_mut(chat_id) else {
                warn!(chat = %chat_id, "Service deleted from a chat missing in the table");
                continue;
            };
            if chat_result.deleted_message_ids.is_empty() {
                debug!(chat = %chat_id, "No ids reported, nothing to verify");
                continue;
            }

            let previous = record.status;
            record.status = ChatStatus::Deleting;
            state.recompute_stats();

            let ids = dedup(&chat_result.deleted_message_ids);
            let items = self.run(chat_id, &ids, true).await;
            summary.push(chat_id, apply(state, chat_id, previous, items));
        }
        Ok(summary)
    }

    /// Delete, verify and one retry; returns items in request order.
    async fn run(
        &self,
        chat_id: ChatId,
        ids: &[MessageId],
        already_deleted: bool,
    ) -> Vec<DeleteItem> {
        let (assumed, delete_failed) = if already_deleted {
            (ids.to_vec(), Vec::new())
        } else {
            self.delete_step(chat_id, ids).await
        };
        let (mut items, verify_failed) = self.verify_step(chat_id, &assumed).await;

        if !delete_failed.is_empty() || !verify_failed.is_empty() {
            let delay = self.retry_delay();
            debug!(
                chat = %chat_id,
                delete_failed = delete_failed.len(),
                verify_failed = verify_failed.len(),
                delay_ms = delay.as_millis(),
                "Retrying failed messages"
            );
            tokio::time::sleep(delay).await;

            let retry_delete: Vec<MessageId> = delete_failed.iter().map(|i| i.message_id).collect();
            let (assumed, still_failed) = self.delete_step(chat_id, &retry_delete).await;

            let mut retry_verify: Vec<MessageId> =
                verify_failed.iter().map(|i| i.message_id).collect();
            retry_verify.extend(assumed);
            let (settled, failed) = self.verify_step(chat_id, &retry_verify).await;

            items.extend(settled);
            items.extend(still_failed);
            items.extend(failed);
        }

        items.sort_by_key(|item| ids.iter().position(|id| *id == item.message_id));
        items
    }

    /// Sends a delete; returns assumed-deleted ids and failures.
    async fn delete_step(
        &self,
        chat_id: ChatId,
        ids: &[MessageId],
    ) -> (Vec<MessageId>, Vec<DeleteItem>) {
        if ids.is_empty() {
            return (Vec::new(), Vec::new());
        }

        match with_timeout(
            self.config.request_timeout,
            self.service.delete_messages(chat_id, ids),
        )
        .await
        {
            Ok(response) => {
                let (assumed, failed) = response.partition(ids);
                let failed = failed
                    .into_iter()
                    .map(|id| {
                        let error = response
                            .results
                            .iter()
                            .find(|r| r.message_id == id)
                            .and_then(|r| r.error.clone())
                            .unwrap_or_else(|| "not deleted".to_string());
                        DeleteItem::failed(chat_id, id, error)
                    })
                    .collect();
                (assumed, failed)
            }
            Err(e) => {
                warn!(chat = %chat_id, count = ids.len(), "Delete request failed: {e}");
                let error = e.to_string();
                let failed = ids
                    .iter()
                    .map(|&id| DeleteItem::failed(chat_id, id, error.clone()))
                    .collect();
                (Vec::new(), failed)
            }
        }
    }

    /// Verifies ids; returns settled items and failures.
    async fn verify_step(
        &self,
        chat_id: ChatId,
        ids: &[MessageId],
    ) -> (Vec<DeleteItem>, Vec<DeleteItem>) {
        if ids.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let response = match with_timeout(
            self.config.request_timeout,
            self.service
                .verify_deletion(chat_id, ids, self.config.verify_window_minutes),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(chat = %chat_id, count = ids.len(), "Verification failed: {e}");
                let error = e.to_string();
                let failed = ids
                    .iter()
                    .map(|&id| DeleteItem::failed(chat_id, id, error.clone()))
                    .collect();
                return (Vec::new(), failed);
            }
        };

        let still: HashSet<MessageId> = response.still_exist.iter().copied().collect();
        let gone: HashSet<MessageId> = response.actually_deleted.iter().copied().collect();

        let mut settled = Vec::new();
        let mut failed = Vec::new();
        for &id in ids {
            if still.contains(&id) {
                settled.push(DeleteItem::new(chat_id, id, DeleteItemStatus::StillExists));
            } else if gone.contains(&id) {
                settled.push(DeleteItem::new(chat_id, id, DeleteItemStatus::Deleted));
            } else {
                failed.push(DeleteItem::failed(chat_id, id, "not reported by verification"));
            }
        }
        (settled, failed)
    }

    fn retry_delay(&self) -> std::time::Duration {
        jitter(self.config.retry_jitter_min, self.config.retry_jitter_max)
    }
}

/// Moves verified ids into the deleted count and restores the status.
fn apply(
    state: &mut ScanJobState,
    chat_id: ChatId,
    previous: ChatStatus,
    items: Vec<DeleteItem>,
) -> DeleteBatchResult {
    let result = DeleteBatchResult::from_items(items);
    let deleted: HashSet<MessageId> = result.deleted().into_iter().collect();

    if let Some(record) = state.chats.get_mut(chat_id) {
        // Records without ids only carry poll counts; any other id must still
        // be listed to count.
        let counted = if record.found_messages.is_empty() {
            deleted.len()
        } else {
            let removed = record.found_messages.remove_all(&deleted);
            if removed < deleted.len() {
                debug!(
                    chat = %chat_id,
                    repeats = deleted.len() - removed,
                    "Verified ids were already counted"
                );
            }
            removed
        };
        let count = u64::try_from(counted).unwrap_or(u64::MAX);
        record.messages_found = record.messages_found.saturating_sub(count);
        record.messages_deleted += count;
        record.status = previous;
    }
    state.recompute_stats();

    let discrepancies = result.discrepancies();
    if !discrepancies.is_empty() {
        warn!(
            chat = %chat_id,
            count = discrepancies.len(),
            ids = ?discrepancies,
            "Messages still exist after delete"
        );
    }
    info!(
        chat = %chat_id,
        deleted = result.total_deleted,
        failed = result.total_failed,
        "Delete batch verified"
    );
    result
}

fn dedup(ids: &[MessageId]) -> Vec<MessageId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
