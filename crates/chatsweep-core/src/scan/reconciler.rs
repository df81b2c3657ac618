//! Merges push events and status polls into one chat table.
//!
//! Two sources report progress for the same job. Stream events arrive in
//! order and drive status transitions; polls arrive every interval and may be
//! stale. The rules:
//!
//! - A chat is created once; a repeated discovery only refreshes metadata.
//! - `progress` and `messages_found` never go down, except when the incoming
//!   data carries a terminal status, which always wins.
//! - A terminal record stays terminal, and polls no longer touch it.
//! - After a stream gap, the next poll replaces every chat that no stream
//!   event touched since the reconnect. The first poll after the stream drops
//!   heals the same way; later polls while it is down merge monotonically.
//!   A heal is the only way values go down without a reset.

use std::collections::HashSet;

use chatsweep_remote::{ScanEvent, ScanStatus, ScannedChat};
use tracing::debug;

use super::model::{ChatScanRecord, ChatStatus, ScanJobState};
use crate::{AccountId, ChatId};

/// Reconciles event and poll updates into a [`ScanJobState`].
#[derive(Debug, Clone)]
pub struct ProgressReconciler {
    state: ScanJobState,
    touched: HashSet<ChatId>,
    had_gap: bool,
    awaiting_heal: bool,
}

impl ProgressReconciler {
    /// Creates a reconciler over an empty job.
    #[must_use]
    pub fn new(account_id: AccountId, job_id: impl Into<String>) -> Self {
        Self {
            state: ScanJobState::new(account_id, job_id),
            touched: HashSet::new(),
            had_gap: false,
            awaiting_heal: false,
        }
    }

    /// Creates a reconciler over a previously saved table.
    ///
    /// The stream counts as disconnected, so the first poll heals the
    /// restored records.
    #[must_use]
    pub fn from_state(mut state: ScanJobState) -> Self {
        state.stream_connected = false;
        state.recompute_stats();
        Self {
            state,
            touched: HashSet::new(),
            had_gap: true,
            awaiting_heal: true,
        }
    }

    /// Current job state.
    #[must_use]
    pub const fn state(&self) -> &ScanJobState {
        &self.state
    }

    /// Mutable job state, for callers that keep `stats` up to date themselves.
    pub const fn state_mut(&mut self) -> &mut ScanJobState {
        &mut self.state
    }

    /// Consumes the reconciler, returning the state.
    #[must_use]
    pub fn into_state(self) -> ScanJobState {
        self.state
    }

    /// Starts a new job, clearing the table.
    pub fn reset(&mut self, job_id: impl Into<String>) {
        let account_id = self.state.account_id.clone();
        self.state = ScanJobState::new(account_id, job_id);
        self.touched.clear();
        self.had_gap = false;
        self.awaiting_heal = false;
    }

    /// Returns true if the next poll will heal untouched chats.
    #[must_use]
    pub const fn is_healing(&self) -> bool {
        self.awaiting_heal
    }

    /// Records that the push stream is attached.
    pub fn stream_up(&mut self) {
        if self.had_gap {
            self.touched.clear();
            self.awaiting_heal = true;
            self.had_gap = false;
        }
        self.state.stream_connected = true;
        self.state.recompute_stats();
    }

    /// Records that the push stream dropped.
    pub fn stream_down(&mut self) {
        self.state.stream_connected = false;
        self.had_gap = true;
        self.awaiting_heal = true;
        self.touched.clear();
        self.state.recompute_stats();
    }

    /// Applies a stream event; returns the records it changed.
    pub fn apply_event(&mut self, event: &ScanEvent) -> Vec<ChatScanRecord> {
        let Some(chat_id) = event.chat_id() else {
            return Vec::new();
        };
        self.touched.insert(chat_id);

        let record = match event {
            ScanEvent::GroupDiscovered { title, .. } => {
                self.state.chats.get_or_insert(chat_id, title)
            }
            ScanEvent::ChatScanning { title, .. } => self
                .state
                .chats
                .get_or_insert(chat_id, title.as_deref().unwrap_or_default()),
            _ => self.state.chats.get_or_insert(chat_id, ""),
        };
        let before = record.clone();

        match event {
            ScanEvent::GroupDiscovered {
                title,
                member_count,
                ..
            } => {
                refresh_metadata(record, title, *member_count);
            }
            _ if record.is_terminal() => {
                debug!(
                    chat = %chat_id,
                    event = event.name(),
                    status = %record.status,
                    "Ignoring event for finished chat"
                );
            }
            ScanEvent::ChatScanning {
                title, progress, ..
            } => {
                if let Some(title) = title {
                    refresh_metadata(record, title, 0);
                }
                record.status = ChatStatus::Scanning;
                record.progress = record.progress.max((*progress).min(100));
            }
            ScanEvent::MessageFound { message_id, .. } => {
                if record.record_found(*message_id) {
                    let seen = u64::try_from(record.found_messages.len()).unwrap_or(u64::MAX);
                    record.messages_found = record.messages_found.max(seen);
                } else {
                    debug!(chat = %chat_id, message = %message_id, "Duplicate message_found");
                }
                if record.status == ChatStatus::Pending {
                    record.status = ChatStatus::Scanning;
                }
            }
            ScanEvent::ChatCompleted { messages_found, .. } => {
                record.status = ChatStatus::Completed;
                record.progress = 100;
                record.messages_found = *messages_found;
                record.error = None;
            }
            ScanEvent::ChatSkipped { reason, .. } => {
                record.status = ChatStatus::Skipped;
                record.error.clone_from(reason);
            }
            ScanEvent::ChatError { error, .. } => {
                record.status = ChatStatus::Error;
                record.error = Some(error.clone());
            }
            _ => {}
        }

        let changed = (*record != before).then(|| record.clone());
        self.state.recompute_stats();
        changed.into_iter().collect()
    }

    /// Applies a poll snapshot; returns the records it changed.
    pub fn apply_poll(&mut self, status: &ScanStatus) -> Vec<ChatScanRecord> {
        let healing = self.is_healing();
        let mut changed = Vec::new();

        for chat in &status.scanned_chats {
            let Some(record) = self.state.chats.get_mut(chat.id) else {
                let record = ChatScanRecord::from_scanned(chat);
                changed.push(record.clone());
                self.state.chats.upsert(record);
                continue;
            };
            let before = record.clone();

            if healing && !self.touched.contains(&chat.id) {
                heal(record, chat);
            } else {
                merge(record, chat);
            }

            if *record != before {
                changed.push(record.clone());
            }
        }

        if healing {
            debug!(
                changed = changed.len(),
                connected = self.state.stream_connected,
                "Healed chat table after stream gap"
            );
            self.awaiting_heal = false;
        }
        self.state.recompute_stats();
        changed
    }
}

fn refresh_metadata(record: &mut ChatScanRecord, title: &str, member_count: u32) {
    if !title.is_empty() {
        title.clone_into(&mut record.title);
    }
    if member_count > 0 {
        record.member_count = member_count;
    }
}

/// Monotonic poll merge. Finished chats are left as they are.
fn merge(record: &mut ChatScanRecord, chat: &ScannedChat) {
    if record.is_terminal() {
        return;
    }
    refresh_metadata(record, &chat.title, chat.member_count);

    let incoming = ChatStatus::from(chat.status);
    if incoming.is_terminal() {
        record.status = incoming;
        record.progress = chat.progress.min(100);
        record.messages_found = chat.messages_found;
        record.error.clone_from(&chat.error);
        return;
    }

    if incoming == ChatStatus::Scanning && record.status == ChatStatus::Pending {
        record.status = ChatStatus::Scanning;
    }
    record.progress = record.progress.max(chat.progress.min(100));
    record.messages_found = record.messages_found.max(chat.messages_found);
}

/// Poll replacement after a stream gap.
fn heal(record: &mut ChatScanRecord, chat: &ScannedChat) {
    let incoming = ChatStatus::from(chat.status);
    if record.is_terminal() && !incoming.is_terminal() {
        return;
    }
    let replacement = ChatScanRecord {
        messages_deleted: record.messages_deleted,
        found_messages: std::mem::take(&mut record.found_messages),
        ..ChatScanRecord::from_scanned(chat)
    };
    *record = replacement;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chatsweep_remote::{MessageId, RemoteChatStatus, RemotePhase};
    use proptest::prelude::*;

    use super::*;

    fn reconciler() -> ProgressReconciler {
        let mut reconciler = ProgressReconciler::new(AccountId::new("acct"), "job-1");
        reconciler.stream_up();
        reconciler
    }

    fn discovered(id: i64, title: &str, members: u32) -> ScanEvent {
        ScanEvent::GroupDiscovered {
            chat_id: ChatId(id),
            title: title.to_string(),
            member_count: members,
        }
    }

    fn scanned(id: i64, status: RemoteChatStatus, progress: u8, found: u64) -> ScannedChat {
        ScannedChat {
            id: ChatId(id),
            title: format!("chat {id}"),
            status,
            messages_found: found,
            progress,
            member_count: 0,
            error: None,
        }
    }

    fn poll(chats: Vec<ScannedChat>) -> ScanStatus {
        ScanStatus {
            phase: RemotePhase::Scanning,
            scanned_chats: chats,
            ..ScanStatus::default()
        }
    }

    #[test]
    fn test_rediscovery_refreshes_metadata_only() {
        let mut r = reconciler();
        r.apply_event(&discovered(1, "Old", 10));
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: None,
            progress: 40,
        });

        let changed = r.apply_event(&discovered(1, "New", 12));
        assert_eq!(changed.len(), 1);

        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(r.state().chats.len(), 1);
        assert_eq!(chat.title, "New");
        assert_eq!(chat.member_count, 12);
        assert_eq!(chat.status, ChatStatus::Scanning);
        assert_eq!(chat.progress, 40);
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: Some("a".to_string()),
            progress: 60,
        });
        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 30, 0)]));
        assert_eq!(r.state().chats.get(ChatId(1)).unwrap().progress, 60);

        let changed = r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: None,
            progress: 20,
        });
        assert!(changed.is_empty());
        assert_eq!(r.state().chats.get(ChatId(1)).unwrap().progress, 60);
    }

    #[test]
    fn test_stream_completion_beats_stale_poll() {
        let mut r = reconciler();
        r.apply_event(&discovered(1, "a", 0));
        r.apply_event(&ScanEvent::ChatCompleted {
            chat_id: ChatId(1),
            messages_found: 3,
        });

        let changed = r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 50, 1)]));
        assert!(changed.is_empty());

        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(chat.status, ChatStatus::Completed);
        assert_eq!(chat.title, "a");
        assert_eq!(chat.messages_found, 3);
        assert_eq!(chat.progress, 100);
    }

    #[test]
    fn test_poll_only_heals_once_then_merges() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: Some("a".to_string()),
            progress: 95,
        });
        r.stream_down();
        assert!(r.is_healing());

        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 90, 2)]));
        assert_eq!(r.state().chats.get(ChatId(1)).unwrap().progress, 90);
        assert!(!r.is_healing());

        let changed = r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 40, 1)]));
        assert!(changed.is_empty());
        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(chat.progress, 90);
        assert_eq!(chat.messages_found, 2);

        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 97, 3)]));
        assert_eq!(r.state().chats.get(ChatId(1)).unwrap().progress, 97);
    }

    #[test]
    fn test_reconnect_after_poll_only_heals_again() {
        let mut r = reconciler();
        r.apply_event(&discovered(1, "a", 0));
        r.stream_down();
        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 60, 0)]));
        assert!(!r.is_healing());

        r.stream_up();
        assert!(r.is_healing());
        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 50, 0)]));
        assert_eq!(r.state().chats.get(ChatId(1)).unwrap().progress, 50);
        assert!(!r.is_healing());
    }

    #[test]
    fn test_restored_state_heals_on_first_poll() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: Some("a".to_string()),
            progress: 70,
        });

        let mut restored = ProgressReconciler::from_state(r.into_state());
        assert!(restored.is_healing());
        restored.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 20, 0)]));
        assert_eq!(restored.state().chats.get(ChatId(1)).unwrap().progress, 20);
        assert!(!restored.is_healing());
    }

    #[test]
    fn test_terminal_poll_wins_over_higher_local_values() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: None,
            progress: 80,
        });
        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Error, 10, 0)]));
        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(chat.status, ChatStatus::Error);
        assert_eq!(chat.progress, 10);
    }

    #[test]
    fn test_duplicate_message_found_counts_once() {
        let mut r = reconciler();
        for _ in 0..3 {
            r.apply_event(&ScanEvent::MessageFound {
                chat_id: ChatId(1),
                message_id: MessageId(7),
            });
        }
        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(chat.messages_found, 1);
        assert_eq!(chat.found_messages, vec![MessageId(7)]);
    }

    #[test]
    fn test_three_chat_scenario() {
        let mut r = reconciler();
        for id in 1..=3 {
            r.apply_event(&discovered(id, &format!("chat {id}"), 5));
        }
        r.apply_event(&ScanEvent::MessageFound {
            chat_id: ChatId(2),
            message_id: MessageId(100),
        });
        r.apply_event(&ScanEvent::MessageFound {
            chat_id: ChatId(2),
            message_id: MessageId(101),
        });
        r.apply_event(&ScanEvent::ChatCompleted {
            chat_id: ChatId(2),
            messages_found: 2,
        });

        let stats = r.state().stats;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_messages_found, 2);
    }

    #[test]
    fn test_heal_after_reconnect_replaces_untouched_chats() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(1),
            title: Some("a".to_string()),
            progress: 70,
        });
        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(2),
            title: Some("b".to_string()),
            progress: 70,
        });
        r.state_mut().chats.get_mut(ChatId(1)).unwrap().messages_deleted = 2;

        r.stream_down();
        r.stream_up();
        assert!(r.is_healing());

        r.apply_event(&ScanEvent::ChatScanning {
            chat_id: ChatId(2),
            title: None,
            progress: 75,
        });
        r.apply_poll(&poll(vec![
            scanned(1, RemoteChatStatus::Scanning, 40, 5),
            scanned(2, RemoteChatStatus::Scanning, 10, 0),
        ]));

        let healed = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(healed.progress, 40);
        assert_eq!(healed.messages_found, 5);
        assert_eq!(healed.messages_deleted, 2);

        let touched = r.state().chats.get(ChatId(2)).unwrap();
        assert_eq!(touched.progress, 75);

        assert!(!r.is_healing());
    }

    #[test]
    fn test_heal_never_reopens_terminal_chat() {
        let mut r = reconciler();
        r.apply_event(&ScanEvent::ChatSkipped {
            chat_id: ChatId(1),
            reason: Some("private".to_string()),
        });
        r.stream_down();
        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, 5, 0)]));

        let chat = r.state().chats.get(ChatId(1)).unwrap();
        assert_eq!(chat.status, ChatStatus::Skipped);
        assert_eq!(chat.error.as_deref(), Some("private"));
    }

    #[test]
    fn test_poll_discovers_new_chats() {
        let mut r = reconciler();
        let changed = r.apply_poll(&poll(vec![
            scanned(4, RemoteChatStatus::Pending, 0, 0),
            scanned(5, RemoteChatStatus::Completed, 100, 1),
        ]));
        assert_eq!(changed.len(), 2);
        assert_eq!(r.state().stats.total, 2);
        assert_eq!(r.state().stats.completed, 1);
    }

    #[test]
    fn test_reset_clears_table() {
        let mut r = reconciler();
        r.apply_event(&discovered(1, "a", 0));
        r.reset("job-2");
        assert!(r.state().chats.is_empty());
        assert_eq!(r.state().job_id, "job-2");
        assert_eq!(r.state().stats.total, 0);
    }

    #[derive(Debug, Clone)]
    enum Input {
        Scanning(u8),
        Found(i64),
        Poll(u8, u64),
    }

    fn input() -> impl Strategy<Value = Input> {
        prop_oneof![
            (0u8..=100).prop_map(Input::Scanning),
            (0i64..20).prop_map(Input::Found),
            ((0u8..=100), (0u64..30)).prop_map(|(p, f)| Input::Poll(p, f)),
        ]
    }

    proptest! {
        #[test]
        fn prop_non_terminal_values_are_monotonic(inputs in prop::collection::vec(input(), 1..60)) {
            let mut r = reconciler();
            r.apply_event(&discovered(1, "a", 0));
            let mut last_progress = 0;
            let mut last_found = 0;

            for input in inputs {
                match input {
                    Input::Scanning(progress) => {
                        r.apply_event(&ScanEvent::ChatScanning {
                            chat_id: ChatId(1),
                            title: None,
                            progress,
                        });
                    }
                    Input::Found(id) => {
                        r.apply_event(&ScanEvent::MessageFound {
                            chat_id: ChatId(1),
                            message_id: MessageId(id),
                        });
                    }
                    Input::Poll(progress, found) => {
                        r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, progress, found)]));
                    }
                }
                let chat = r.state().chats.get(ChatId(1)).unwrap();
                prop_assert!(chat.progress >= last_progress);
                prop_assert!(chat.messages_found >= last_found);
                prop_assert!(chat.progress <= 100);
                last_progress = chat.progress;
                last_found = chat.messages_found;
            }
        }

        #[test]
        fn prop_terminal_status_sticks(
            before in prop::collection::vec(input(), 0..20),
            after in prop::collection::vec(input(), 0..20),
        ) {
            let mut r = reconciler();
            let feed = |r: &mut ProgressReconciler, inputs: &[Input]| {
                for input in inputs {
                    match input {
                        Input::Scanning(progress) => {
                            r.apply_event(&ScanEvent::ChatScanning {
                                chat_id: ChatId(1),
                                title: None,
                                progress: *progress,
                            });
                        }
                        Input::Found(id) => {
                            r.apply_event(&ScanEvent::MessageFound {
                                chat_id: ChatId(1),
                                message_id: MessageId(*id),
                            });
                        }
                        Input::Poll(progress, found) => {
                            r.apply_poll(&poll(vec![scanned(1, RemoteChatStatus::Scanning, *progress, *found)]));
                        }
                    }
                }
            };

            feed(&mut r, &before);
            r.apply_event(&ScanEvent::ChatCompleted { chat_id: ChatId(1), messages_found: 9 });
            feed(&mut r, &after);

            let chat = r.state().chats.get(ChatId(1)).unwrap();
            prop_assert_eq!(chat.status, ChatStatus::Completed);
            prop_assert_eq!(chat.messages_found, 9);
            prop_assert_eq!(r.state().stats.completed, 1);
        }
    }
}
