//! In-process fakes of the remote services.

#![allow(dead_code, clippy::unwrap_used)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::ops::Deref;
use std::rc::Rc;
use std::time::Duration;

use chatsweep_core::{AccountId, ChatId, MessageId, SessionConfig, SessionStores};
use chatsweep_remote::{
    Ack, EventStream, RemoteChatStatus, RemotePhase, ScanEvent, ScanOptions, ScanService,
    ScanStatus, ScannedChat,
};
use tokio::sync::mpsc;

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Event stream fed by the test through a channel.
pub struct ChannelStream(mpsc::UnboundedReceiver<ScanEvent>);

impl EventStream for ChannelStream {
    async fn next_event(&mut self) -> chatsweep_remote::Result<Option<ScanEvent>> {
        Ok(self.0.recv().await)
    }
}

/// Scan service fake. Clones share one [`FakeState`], so the test keeps a
/// handle while the session owns another.
#[derive(Clone, Default)]
pub struct FakeScanService(Rc<FakeState>);

/// Scripted behaviour and recorded calls. Streams are handed out in the order
/// they were added; opening a stream when none is queued fails with a 503.
#[derive(Default)]
pub struct FakeState {
    streams: RefCell<VecDeque<ChannelStream>>,
    pub status: RefCell<ScanStatus>,
    pub calls: RefCell<Vec<&'static str>>,
    pub stop_hangs: Cell<bool>,
    pub reject_start: Cell<bool>,
}

impl FakeScanService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Deref for FakeScanService {
    type Target = FakeState;

    fn deref(&self) -> &FakeState {
        &self.0
    }
}

impl FakeState {

    /// Queues a stream; the returned sender feeds it, dropping it ends it.
    pub fn add_stream(&self) -> mpsc::UnboundedSender<ScanEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.borrow_mut().push_back(ChannelStream(rx));
        tx
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn set_status(&self, phase: RemotePhase, chats: Vec<ScannedChat>) {
        *self.status.borrow_mut() = ScanStatus {
            phase,
            total_chats: u32::try_from(chats.len()).unwrap(),
            scanned_chats: chats,
            ..ScanStatus::default()
        };
    }
}

impl ScanService for FakeScanService {
    type Stream = ChannelStream;

    async fn start_scan(
        &self,
        _account: &AccountId,
        _options: &ScanOptions,
    ) -> chatsweep_remote::Result<Ack> {
        self.calls.borrow_mut().push("start");
        if self.reject_start.get() {
            return Ok(Ack {
                success: false,
                message: Some("account busy".to_string()),
            });
        }
        Ok(Ack::ok())
    }

    async fn pause_scan(&self, _account: &AccountId) -> chatsweep_remote::Result<Ack> {
        self.calls.borrow_mut().push("pause");
        Ok(Ack::ok())
    }

    async fn resume_scan(&self, _account: &AccountId) -> chatsweep_remote::Result<Ack> {
        self.calls.borrow_mut().push("resume");
        Ok(Ack::ok())
    }

    async fn stop_scan(&self, _account: &AccountId) -> chatsweep_remote::Result<Ack> {
        self.calls.borrow_mut().push("stop");
        if self.stop_hangs.get() {
            std::future::pending::<()>().await;
        }
        Ok(Ack::ok())
    }

    async fn scan_status(&self, _account: &AccountId) -> chatsweep_remote::Result<ScanStatus> {
        Ok(self.status.borrow().clone())
    }

    async fn open_events(&self, _account: &AccountId) -> chatsweep_remote::Result<ChannelStream> {
        self.calls.borrow_mut().push("open");
        self.streams
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| chatsweep_remote::Error::Status {
                status: 503,
                body: "stream unavailable".to_string(),
            })
    }
}

pub fn account() -> AccountId {
    AccountId::new("acct-1")
}

pub const POLL: Duration = Duration::from_millis(20);
pub const STOP_TIMEOUT: Duration = Duration::from_millis(100);
pub const BACKOFF: Duration = Duration::from_millis(20);

/// Millisecond timings on the real clock; the sqlite pool needs real time.
pub fn fast_config() -> SessionConfig {
    SessionConfig::new()
        .poll_interval(POLL)
        .stop_timeout(STOP_TIMEOUT)
        .reconnect(BACKOFF, 2)
}

pub async fn stores() -> SessionStores {
    SessionStores::in_memory().await.unwrap()
}

pub fn discovered(id: i64, title: &str) -> ScanEvent {
    ScanEvent::GroupDiscovered {
        chat_id: ChatId(id),
        title: title.to_string(),
        member_count: 10,
    }
}

pub fn found(chat: i64, message: i64) -> ScanEvent {
    ScanEvent::MessageFound {
        chat_id: ChatId(chat),
        message_id: MessageId(message),
    }
}

pub fn scanned(id: i64, status: RemoteChatStatus, progress: u8, found: u64) -> ScannedChat {
    ScannedChat {
        id: ChatId(id),
        title: format!("chat {id}"),
        status,
        messages_found: found,
        progress,
        member_count: 10,
        error: None,
    }
}
