//! Scan job domain models.

use std::collections::{HashMap, HashSet};

use chatsweep_remote::{RemoteChatStatus, ScannedChat};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ChatId, MessageId};

/// Status of one chat within a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    /// Discovered, not scanned yet.
    #[default]
    Pending,
    /// Being scanned.
    Scanning,
    /// Scan finished.
    Completed,
    /// Skipped by the scanner.
    Skipped,
    /// Scan failed.
    Error,
    /// A delete batch is running against the chat.
    Deleting,
}

impl ChatStatus {
    /// Returns true for statuses a chat reaches exactly once.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Error)
    }

    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Error => "error",
            Self::Deleting => "deleting",
        }
    }
}

impl From<RemoteChatStatus> for ChatStatus {
    fn from(status: RemoteChatStatus) -> Self {
        match status {
            RemoteChatStatus::Pending | RemoteChatStatus::Unknown => Self::Pending,
            RemoteChatStatus::Scanning => Self::Scanning,
            RemoteChatStatus::Completed => Self::Completed,
            RemoteChatStatus::Skipped => Self::Skipped,
            RemoteChatStatus::Error => Self::Error,
        }
    }
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat within a scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatScanRecord {
    /// Chat identifier.
    pub id: ChatId,
    /// Chat title.
    pub title: String,
    /// Scan status.
    pub status: ChatStatus,
    /// Matching messages found and not yet verified deleted.
    pub messages_found: u64,
    /// Messages verified deleted.
    #[serde(default)]
    pub messages_deleted: u64,
    /// Scan progress, 0 to 100.
    pub progress: u8,
    /// Number of members.
    #[serde(default)]
    pub member_count: u32,
    /// Error or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ids reported by `message_found` and not yet verified deleted.
    #[serde(default)]
    pub found_messages: FoundMessages,
}

impl ChatScanRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(id: ChatId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            status: ChatStatus::Pending,
            messages_found: 0,
            messages_deleted: 0,
            progress: 0,
            member_count: 0,
            error: None,
            found_messages: FoundMessages::new(),
        }
    }

    /// Builds a record from a poll snapshot entry.
    #[must_use]
    pub fn from_scanned(chat: &ScannedChat) -> Self {
        Self {
            id: chat.id,
            title: chat.title.clone(),
            status: chat.status.into(),
            messages_found: chat.messages_found,
            messages_deleted: 0,
            progress: chat.progress.min(100),
            member_count: chat.member_count,
            error: chat.error.clone(),
            found_messages: FoundMessages::new(),
        }
    }

    /// Returns true if the record reached a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Records a found message id; returns false for a duplicate.
    pub fn record_found(&mut self, message_id: MessageId) -> bool {
        self.found_messages.insert(message_id)
    }
}

/// Message ids in arrival order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MessageId>", into = "Vec<MessageId>")]
pub struct FoundMessages {
    ids: Vec<MessageId>,
    index: HashSet<MessageId>,
}

impl FoundMessages {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no id is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if the id is in the list.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.index.contains(&id)
    }

    /// Appends an id; returns false if it was already present.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if !self.index.insert(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Removes the given ids; returns how many were present.
    pub fn remove_all(&mut self, ids: &HashSet<MessageId>) -> usize {
        let before = self.ids.len();
        self.ids.retain(|id| !ids.contains(id));
        self.index.retain(|id| !ids.contains(id));
        before - self.ids.len()
    }

    /// Ids in arrival order.
    #[must_use]
    pub fn as_slice(&self) -> &[MessageId] {
        &self.ids
    }

    /// Copies the ids out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<MessageId> {
        self.ids.clone()
    }
}

impl From<Vec<MessageId>> for FoundMessages {
    fn from(ids: Vec<MessageId>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<FoundMessages> for Vec<MessageId> {
    fn from(found: FoundMessages) -> Self {
        found.ids
    }
}

impl FromIterator<MessageId> for FoundMessages {
    fn from_iter<I: IntoIterator<Item = MessageId>>(iter: I) -> Self {
        let mut found = Self::new();
        for id in iter {
            found.insert(id);
        }
        found
    }
}

impl PartialEq<Vec<MessageId>> for FoundMessages {
    fn eq(&self, other: &Vec<MessageId>) -> bool {
        &self.ids == other
    }
}

/// Chat records keyed by id, iterated in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ChatScanRecord>", into = "Vec<ChatScanRecord>")]
pub struct ChatTable {
    records: Vec<ChatScanRecord>,
    index: HashMap<ChatId, usize>,
}

impl ChatTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no chat was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if the chat is in the table.
    #[must_use]
    pub fn contains(&self, id: ChatId) -> bool {
        self.index.contains_key(&id)
    }

    /// Looks up a chat.
    #[must_use]
    pub fn get(&self, id: ChatId) -> Option<&ChatScanRecord> {
        self.index.get(&id).map(|&i| &self.records[i])
    }

    /// Looks up a chat mutably.
    pub fn get_mut(&mut self, id: ChatId) -> Option<&mut ChatScanRecord> {
        self.index.get(&id).map(|&i| &mut self.records[i])
    }

    /// Returns the chat, appending a pending record if it is new.
    pub fn get_or_insert(&mut self, id: ChatId, title: &str) -> &mut ChatScanRecord {
        let i = match self.index.get(&id) {
            Some(&i) => i,
            None => {
                self.records.push(ChatScanRecord::new(id, title));
                self.index.insert(id, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        &mut self.records[i]
    }

    /// Inserts or replaces a record; new chats keep discovery order.
    pub fn upsert(&mut self, record: ChatScanRecord) {
        if let Some(&i) = self.index.get(&record.id) {
            self.records[i] = record;
        } else {
            self.index.insert(record.id, self.records.len());
            self.records.push(record);
        }
    }

    /// Iterates records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatScanRecord> {
        self.records.iter()
    }

    /// Iterates records mutably in discovery order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChatScanRecord> {
        self.records.iter_mut()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

impl From<Vec<ChatScanRecord>> for ChatTable {
    fn from(records: Vec<ChatScanRecord>) -> Self {
        let mut table = Self::new();
        for record in records {
            table.upsert(record);
        }
        table
    }
}

impl From<ChatTable> for Vec<ChatScanRecord> {
    fn from(table: ChatTable) -> Self {
        table.records
    }
}

/// Phase of a scan job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// No job.
    #[default]
    Idle,
    /// Discovering chats.
    Discovering,
    /// Scanning chats.
    Scanning,
    /// Paused locally.
    Paused,
    /// Stop requested.
    Stopping,
    /// Job ended.
    Completed,
    /// Job failed.
    Error,
}

impl ScanPhase {
    /// Returns true while the job holds the account.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Completed | Self::Error)
    }

    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Scanning => "scanning",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counts derived from the chat table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    /// Chats discovered.
    pub total: usize,
    /// Chats completed.
    pub completed: usize,
    /// Chats being scanned.
    pub scanning: usize,
    /// Chats waiting to be scanned.
    pub pending: usize,
    /// Chats skipped.
    pub skipped: usize,
    /// Chats whose scan failed.
    pub failed: usize,
    /// Sum of `messages_found`.
    pub total_messages_found: u64,
    /// Sum of `messages_deleted`.
    pub total_messages_deleted: u64,
}

impl ScanStats {
    /// Computes stats over a chat table.
    #[must_use]
    pub fn compute(chats: &ChatTable) -> Self {
        chats.iter().fold(Self::default(), |mut stats, chat| {
            stats.total += 1;
            match chat.status {
                ChatStatus::Completed => stats.completed += 1,
                ChatStatus::Scanning => stats.scanning += 1,
                ChatStatus::Pending => stats.pending += 1,
                ChatStatus::Skipped => stats.skipped += 1,
                ChatStatus::Error => stats.failed += 1,
                ChatStatus::Deleting => {}
            }
            stats.total_messages_found += chat.messages_found;
            stats.total_messages_deleted += chat.messages_deleted;
            stats
        })
    }
}

/// One account's scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJobState {
    /// Job identifier, shared with the resume snapshot.
    pub job_id: String,
    /// Account being scanned.
    pub account_id: AccountId,
    /// Job phase.
    pub phase: ScanPhase,
    /// Per-chat records.
    pub chats: ChatTable,
    /// Counts derived from `chats`.
    pub stats: ScanStats,
    /// Whether the push stream is attached.
    pub stream_connected: bool,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl ScanJobState {
    /// Creates an idle, empty job.
    #[must_use]
    pub fn new(account_id: AccountId, job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            account_id,
            phase: ScanPhase::Idle,
            chats: ChatTable::new(),
            stats: ScanStats::default(),
            stream_connected: false,
            updated_at: Utc::now(),
        }
    }

    /// Recomputes `stats` from `chats` and bumps `updated_at`.
    pub fn recompute_stats(&mut self) {
        self.stats = ScanStats::compute(&self.chats);
        self.updated_at = Utc::now();
    }

    /// Chats that still have found messages.
    pub fn chats_with_messages(&self) -> impl Iterator<Item = &ChatScanRecord> {
        self.chats.iter().filter(|chat| chat.messages_found > 0)
    }
}
