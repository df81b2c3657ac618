//! Scan job state machine for one account.
//!
//! A session drives one job at a time: it sends commands to the scan service,
//! feeds the push stream and the status poll through a
//! [`ProgressReconciler`], reconnects the stream with a fixed backoff and
//! falls back to polling alone when reconnecting keeps failing. It checkpoints
//! the job in the [`ResumeStore`] so a restarted client can continue it.
//!
//! The session does not spawn tasks. The caller drives it by awaiting
//! [`ScanSession::next_update`] in a loop, interleaving commands
//! (`pause`, `stop`, ...) between updates.
//!
//! # Example
//!
//! ```ignore
//! let mut session = ScanSession::new(client, account, config, stores).await?;
//! if session.pending_resume().is_some() {
//!     session.continue_from_snapshot().await?;
//! } else {
//!     session.start(&ScanOptions::default()).await?;
//! }
//! while let Some(update) = session.next_update().await? {
//!     render(session.state(), &update);
//! }
//! session.close().await?;
//! ```

use std::time::Duration;

use chatsweep_remote::{EventStream, RemotePhase, ScanEvent, ScanOptions, ScanService, ScanStatus};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::cache::ScanStateCache;
use super::model::{ChatScanRecord, ScanJobState, ScanPhase};
use super::reconciler::ProgressReconciler;
use super::registry::{ActiveScanGuard, ActiveScans};
use crate::config::{EngineConfig, SessionConfig};
use crate::resume::{OperationKind, ResumeSnapshot, ResumeStore};
use crate::retry::{jitter, retry_once, with_timeout};
use crate::{AccountId, Error, Result};

const RETRY_JITTER_MIN: Duration = Duration::from_millis(250);
const RETRY_JITTER_MAX: Duration = Duration::from_secs(1);

/// Checkpointed steps of a scan job.
const SCAN_STEPS: [&str; 3] = ["Start scan", "Discover chats", "Scan chats"];

/// Durable collaborators shared by sessions.
#[derive(Debug, Clone)]
pub struct SessionStores {
    /// Resume checkpoint slot.
    pub resume: ResumeStore,
    /// Scan table cache.
    pub cache: ScanStateCache,
    /// Active job registry.
    pub registry: ActiveScans,
}

/// Something observable changed while driving a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Chat records changed.
    Chats(Vec<ChatScanRecord>),
    /// The job moved to a new active phase.
    Phase(ScanPhase),
    /// The push stream dropped; a reconnect is scheduled.
    StreamLost {
        /// Attempt number of the scheduled reconnect.
        attempt: u32,
        /// Delay before the attempt.
        retry_in: Duration,
    },
    /// The push stream is attached again.
    StreamRestored,
    /// Reconnecting gave up; progress now comes from polling alone.
    PollOnly,
    /// The job ended in the given phase.
    Finished(ScanPhase),
}

impl SessionStores {
    /// Opens the stores on the configured database, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or opened.
    pub async fn open(config: &EngineConfig) -> Result<Self> {
        let path = config.database_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        debug!(path = %path.display(), "Opened engine database");
        Self::from_pool(pool).await
    }

    /// Opens the stores on a shared in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        Ok(Self {
            resume: ResumeStore::from_pool(pool.clone()).await?,
            cache: ScanStateCache::from_pool(pool).await?,
            registry: ActiveScans::new(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingReconnect {
    attempt: u32,
    at: Instant,
}

enum Wake {
    Event(chatsweep_remote::Result<Option<ScanEvent>>),
    Poll,
    Reconnect,
}

/// State machine for one account's scan job.
pub struct ScanSession<S: ScanService> {
    service: S,
    config: SessionConfig,
    stores: SessionStores,
    reconciler: ProgressReconciler,
    claim: Option<ActiveScanGuard>,
    stream: Option<S::Stream>,
    poll: Option<Interval>,
    reconnect: Option<PendingReconnect>,
    pending_resume: Option<ResumeSnapshot>,
    snapshot_id: Option<String>,
    paused_from: ScanPhase,
    stop_requested: bool,
}

impl<S: ScanService> ScanSession<S> {
    /// Creates an idle session and looks up a resumable scan for the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the resume store cannot be read.
    pub async fn new(
        service: S,
        account_id: AccountId,
        config: SessionConfig,
        stores: SessionStores,
    ) -> Result<Self> {
        let pending_resume = stores
            .resume
            .find_pending(&account_id, OperationKind::Scan)
            .await?;
        if let Some(snapshot) = &pending_resume {
            info!(
                account = %account_id,
                job = %snapshot.id,
                started_at = %snapshot.started_at,
                "Found resumable scan"
            );
        }

        Ok(Self {
            service,
            config,
            stores,
            reconciler: ProgressReconciler::new(account_id, String::new()),
            claim: None,
            stream: None,
            poll: None,
            reconnect: None,
            pending_resume,
            snapshot_id: None,
            paused_from: ScanPhase::Scanning,
            stop_requested: false,
        })
    }

    /// The account this session scans.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        &self.reconciler.state().account_id
    }

    /// Reconciled job state.
    #[must_use]
    pub const fn state(&self) -> &ScanJobState {
        self.reconciler.state()
    }

    /// Mutable job state, used by the delete coordinator.
    pub const fn state_mut(&mut self) -> &mut ScanJobState {
        self.reconciler.state_mut()
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> ScanPhase {
        self.reconciler.state().phase
    }

    /// Resumable scan found for this account, if any.
    #[must_use]
    pub const fn pending_resume(&self) -> Option<&ResumeSnapshot> {
        self.pending_resume.as_ref()
    }

    /// Returns true while the job runs on polling alone.
    #[must_use]
    pub const fn is_poll_only(&self) -> bool {
        self.phase().is_active() && self.stream.is_none() && self.reconnect.is_none()
    }

    /// Returns true while anything can still produce an update.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.stream.is_some() || self.poll.is_some() || self.reconnect.is_some()
    }

    /// Starts a new scan job.
    ///
    /// Sends the start command, opens the push stream, starts the status poll
    /// and writes a resume checkpoint. A pending resumable scan is superseded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyActive`] if a job is running for the account,
    /// or the remote error if the start command is refused or fails twice.
    pub async fn start(&mut self, options: &ScanOptions) -> Result<()> {
        if self.phase().is_active() {
            return Err(Error::AlreadyActive(self.account_id().clone()));
        }
        let claim = self.stores.registry.claim(self.account_id())?;
        let account_id = self.account_id().clone();

        let mut snapshot = ResumeSnapshot::new(
            OperationKind::Scan,
            account_id.clone(),
            format!("Scan of account {account_id}"),
            SCAN_STEPS.iter().map(ToString::to_string).collect(),
        );

        info!(account = %account_id, job = %snapshot.id, "Starting scan");
        let (service, account) = (&self.service, &account_id);
        retry_once(
            "start_scan",
            self.config.request_timeout,
            jitter(RETRY_JITTER_MIN, RETRY_JITTER_MAX),
            move || service.start_scan(account, options),
        )
        .await?
        .into_result()?;

        self.claim = Some(claim);
        self.pending_resume = None;
        self.stop_requested = false;
        self.reconciler.reset(snapshot.id.clone());
        self.set_phase(ScanPhase::Discovering);

        snapshot.completed_steps = 1;
        self.stores.resume.save(&snapshot).await?;
        self.stores.cache.save(self.reconciler.state()).await?;
        self.stores.cache.prune(&account_id, &snapshot.id).await?;
        self.snapshot_id = Some(snapshot.id);

        self.attach().await;
        Ok(())
    }

    /// Continues the pending resumable scan without re-running discovery.
    ///
    /// Restores the cached chat table of that job, if any, and re-attaches the
    /// stream and the poll.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if there is nothing to resume, or
    /// [`Error::AlreadyActive`] if a job is running for the account.
    pub async fn continue_from_snapshot(&mut self) -> Result<()> {
        if self.phase().is_active() {
            return Err(Error::AlreadyActive(self.account_id().clone()));
        }
        let Some(snapshot) = self.pending_resume.take() else {
            return Err(Error::InvalidState("no resumable scan".to_string()));
        };
        let claim = match self.stores.registry.claim(self.account_id()) {
            Ok(claim) => claim,
            Err(e) => {
                self.pending_resume = Some(snapshot);
                return Err(e);
            }
        };

        let account_id = self.account_id().clone();
        self.reconciler = match self.stores.cache.load(&account_id, &snapshot.id).await? {
            Some(state) => {
                info!(job = %snapshot.id, chats = state.chats.len(), "Restored cached scan table");
                ProgressReconciler::from_state(state)
            }
            None => ProgressReconciler::new(account_id, snapshot.id.clone()),
        };

        info!(account = %self.account_id(), job = %snapshot.id, "Continuing scan");
        self.claim = Some(claim);
        self.stop_requested = false;
        self.set_phase(ScanPhase::Scanning);
        self.snapshot_id = Some(snapshot.id);

        self.attach().await;
        Ok(())
    }

    /// Drops the pending resumable scan and clears its checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the resume store cannot be written.
    pub async fn discard_resume(&mut self) -> Result<()> {
        if let Some(snapshot) = self.pending_resume.take() {
            info!(job = %snapshot.id, "Discarding resumable scan");
            self.stores.resume.complete(&snapshot.id).await?;
        }
        Ok(())
    }

    /// Pauses the job locally; stream and poll stay attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] without a running job, or the remote error
    /// when pause forwarding is enabled and the command fails.
    pub async fn pause(&mut self) -> Result<()> {
        match self.phase() {
            ScanPhase::Paused => return Ok(()),
            ScanPhase::Discovering | ScanPhase::Scanning => {}
            ScanPhase::Stopping => {
                return Err(Error::InvalidState("scan is stopping".to_string()));
            }
            ScanPhase::Idle | ScanPhase::Completed | ScanPhase::Error => {
                return Err(Error::NotStarted);
            }
        }

        if self.config.forward_pause {
            let (service, account) = (&self.service, &self.reconciler.state().account_id);
            retry_once(
                "pause_scan",
                self.config.request_timeout,
                jitter(RETRY_JITTER_MIN, RETRY_JITTER_MAX),
                move || service.pause_scan(account),
            )
            .await?
            .into_result()?;
        }

        self.paused_from = self.phase();
        self.set_phase(ScanPhase::Paused);
        self.stores.cache.save(self.reconciler.state()).await?;
        Ok(())
    }

    /// Leaves the paused phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the job is not paused, or the remote
    /// error when pause forwarding is enabled and the command fails.
    pub async fn resume(&mut self) -> Result<()> {
        if self.phase() != ScanPhase::Paused {
            return Err(Error::InvalidState(format!(
                "cannot resume from {}",
                self.phase()
            )));
        }

        if self.config.forward_pause {
            let (service, account) = (&self.service, &self.reconciler.state().account_id);
            retry_once(
                "resume_scan",
                self.config.request_timeout,
                jitter(RETRY_JITTER_MIN, RETRY_JITTER_MAX),
                move || service.resume_scan(account),
            )
            .await?
            .into_result()?;
        }

        self.set_phase(self.paused_from);
        Ok(())
    }

    /// Stops the job.
    ///
    /// Detaches stream and poll, sends one stop command bounded by the stop
    /// timeout and completes the job whether or not it was acknowledged.
    /// Calling it again once stopping or finished does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotStarted`] if no job was started, or an error if the
    /// local stores cannot be written.
    pub async fn stop(&mut self) -> Result<()> {
        match self.phase() {
            ScanPhase::Idle => return Err(Error::NotStarted),
            ScanPhase::Stopping | ScanPhase::Completed | ScanPhase::Error => {
                debug!(phase = %self.phase(), "Stop ignored");
                return Ok(());
            }
            ScanPhase::Discovering | ScanPhase::Scanning | ScanPhase::Paused => {}
        }

        self.set_phase(ScanPhase::Stopping);
        self.stop_requested = true;
        self.detach();

        let account_id = self.account_id().clone();
        match with_timeout(self.config.stop_timeout, self.service.stop_scan(&account_id)).await {
            Ok(ack) if ack.success => info!(account = %account_id, "Scan stop acknowledged"),
            Ok(ack) => warn!(
                account = %account_id,
                message = ack.message.as_deref().unwrap_or_default(),
                "Scan stop refused"
            ),
            Err(e) => warn!(account = %account_id, "Scan stop not acknowledged: {e}"),
        }

        self.finish(ScanPhase::Completed, true).await
    }

    /// Waits for the next observable change.
    ///
    /// Returns `None` once nothing is attached: the job finished, was stopped,
    /// or was never started.
    ///
    /// # Errors
    ///
    /// Returns an error if the local stores cannot be written.
    pub async fn next_update(&mut self) -> Result<Option<SessionUpdate>> {
        while self.is_running() {
            let wake = tokio::select! {
                result = next_event(self.stream.as_mut()) => Wake::Event(result),
                () = next_tick(self.poll.as_mut()) => Wake::Poll,
                () = wait_until(self.reconnect.map(|r| r.at)) => Wake::Reconnect,
            };

            let update = match wake {
                Wake::Event(Ok(Some(event))) => self.handle_event(event).await?,
                Wake::Event(Ok(None)) => {
                    info!(account = %self.account_id(), "Event stream ended");
                    Some(self.stream_lost())
                }
                Wake::Event(Err(e)) => {
                    warn!(account = %self.account_id(), "Event stream failed: {e}");
                    Some(self.stream_lost())
                }
                Wake::Poll => self.handle_poll().await?,
                Wake::Reconnect => self.try_reconnect().await,
            };

            if update.is_some() {
                return Ok(update);
            }
        }
        Ok(None)
    }

    /// Drives the session until the job finishes; returns the final phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the local stores cannot be written.
    pub async fn run_until_finished(&mut self) -> Result<ScanPhase> {
        while self.next_update().await?.is_some() {}
        Ok(self.phase())
    }

    /// Tears the session down.
    ///
    /// Detaches stream and poll, caches the chat table and releases the
    /// account. The resume checkpoint is left as is, so a running job stays
    /// resumable.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    pub async fn close(&mut self) -> Result<()> {
        self.detach();
        self.claim = None;
        if !self.reconciler.state().job_id.is_empty() {
            self.stores.cache.save(self.reconciler.state()).await?;
        }
        debug!(account = %self.account_id(), "Scan session closed");
        Ok(())
    }

    async fn handle_event(&mut self, event: ScanEvent) -> Result<Option<SessionUpdate>> {
        debug!(event = event.name(), "Scan event");
        match event {
            ScanEvent::Phase1Complete { total_chats } | ScanEvent::Phase2Start { total_chats } => {
                if !self.finish_discovery().await? {
                    return Ok(None);
                }
                info!(account = %self.account_id(), total_chats, "Discovery finished");
                Ok((self.phase() == ScanPhase::Scanning)
                    .then_some(SessionUpdate::Phase(ScanPhase::Scanning)))
            }
            ScanEvent::ScanComplete {
                total_messages_found,
            } => {
                info!(account = %self.account_id(), total_messages_found, "Scan complete");
                self.finish(ScanPhase::Completed, true).await?;
                Ok(Some(SessionUpdate::Finished(ScanPhase::Completed)))
            }
            ScanEvent::ScanIdle => {
                info!(account = %self.account_id(), "Scan service went idle");
                self.finish(ScanPhase::Completed, self.stop_requested).await?;
                Ok(Some(SessionUpdate::Finished(ScanPhase::Completed)))
            }
            ScanEvent::Error { message } => {
                warn!(account = %self.account_id(), %message, "Scan failed");
                self.finish(ScanPhase::Error, false).await?;
                Ok(Some(SessionUpdate::Finished(ScanPhase::Error)))
            }
            event => {
                let changed = self.reconciler.apply_event(&event);
                Ok((!changed.is_empty()).then_some(SessionUpdate::Chats(changed)))
            }
        }
    }

    async fn handle_poll(&mut self) -> Result<Option<SessionUpdate>> {
        let account_id = self.account_id().clone();
        let status = match with_timeout(
            self.config.request_timeout,
            self.service.scan_status(&account_id),
        )
        .await
        {
            Ok(status) => status,
            Err(e) => {
                debug!(account = %account_id, "Status poll failed: {e}");
                return Ok(None);
            }
        };

        let changed = self.reconciler.apply_poll(&status);

        if self.is_poll_only()
            && let Some(update) = self.finish_from_poll(&status).await?
        {
            return Ok(Some(update));
        }

        if status.phase == RemotePhase::Scanning
            && self.finish_discovery().await?
            && changed.is_empty()
            && self.phase() == ScanPhase::Scanning
        {
            return Ok(Some(SessionUpdate::Phase(ScanPhase::Scanning)));
        }

        Ok((!changed.is_empty()).then_some(SessionUpdate::Chats(changed)))
    }

    /// Detects the end of the job from the poll while the stream is gone.
    async fn finish_from_poll(&mut self, status: &ScanStatus) -> Result<Option<SessionUpdate>> {
        let phase = match status.phase {
            RemotePhase::Completed => ScanPhase::Completed,
            RemotePhase::Error => ScanPhase::Error,
            // The service reports idle before it begins; only trust it once
            // discovery is over.
            RemotePhase::Idle if !self.in_discovery() => ScanPhase::Completed,
            _ => return Ok(None),
        };

        info!(account = %self.account_id(), remote = ?status.phase, "Job ended (poll)");
        let clear = status.phase == RemotePhase::Completed || self.stop_requested;
        self.finish(phase, clear).await?;
        Ok(Some(SessionUpdate::Finished(phase)))
    }

    /// Returns true while discovery runs, paused or not.
    fn in_discovery(&self) -> bool {
        match self.phase() {
            ScanPhase::Discovering => true,
            ScanPhase::Paused => self.paused_from == ScanPhase::Discovering,
            _ => false,
        }
    }

    /// Moves the job past discovery and checkpoints it. A paused job stays
    /// paused and resumes into scanning. Returns false if discovery was
    /// already over.
    async fn finish_discovery(&mut self) -> Result<bool> {
        if !self.in_discovery() {
            return Ok(false);
        }
        if self.phase() == ScanPhase::Paused {
            self.paused_from = ScanPhase::Scanning;
        } else {
            self.set_phase(ScanPhase::Scanning);
        }
        if let Some(id) = &self.snapshot_id {
            self.stores.resume.record_progress(id, 2).await?;
        }
        self.stores.cache.save(self.reconciler.state()).await?;
        Ok(true)
    }

    fn stream_lost(&mut self) -> SessionUpdate {
        self.stream = None;
        self.reconciler.stream_down();
        self.schedule_reconnect(1)
    }

    fn schedule_reconnect(&mut self, attempt: u32) -> SessionUpdate {
        if attempt > self.config.max_reconnect_attempts {
            info!(
                account = %self.account_id(),
                attempts = self.config.max_reconnect_attempts,
                "Giving up on event stream, polling only"
            );
            self.reconnect = None;
            return SessionUpdate::PollOnly;
        }

        let retry_in = self.config.reconnect_backoff;
        self.reconnect = Some(PendingReconnect {
            attempt,
            at: Instant::now() + retry_in,
        });
        SessionUpdate::StreamLost { attempt, retry_in }
    }

    async fn try_reconnect(&mut self) -> Option<SessionUpdate> {
        let PendingReconnect { attempt, .. } = self.reconnect.take()?;
        let account_id = self.account_id().clone();
        info!(account = %account_id, attempt, "Reconnecting event stream");

        match with_timeout(
            self.config.request_timeout,
            self.service.open_events(&account_id),
        )
        .await
        {
            Ok(stream) => {
                self.stream = Some(stream);
                self.reconciler.stream_up();
                info!(account = %account_id, attempt, "Event stream restored");
                Some(SessionUpdate::StreamRestored)
            }
            Err(e) => {
                warn!(account = %account_id, attempt, "Reconnect failed: {e}");
                match self.schedule_reconnect(attempt + 1) {
                    SessionUpdate::PollOnly => Some(SessionUpdate::PollOnly),
                    _ => None,
                }
            }
        }
    }

    /// Opens the stream and starts the poll.
    async fn attach(&mut self) {
        let account_id = self.account_id().clone();
        match with_timeout(
            self.config.request_timeout,
            self.service.open_events(&account_id),
        )
        .await
        {
            Ok(stream) => {
                self.stream = Some(stream);
                self.reconciler.stream_up();
            }
            Err(e) => {
                warn!(account = %account_id, "Could not open event stream: {e}");
                self.stream_lost();
            }
        }

        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(poll);
    }

    fn detach(&mut self) {
        self.stream = None;
        self.poll = None;
        self.reconnect = None;
        if self.reconciler.state().stream_connected {
            self.reconciler.stream_down();
        }
    }

    async fn finish(&mut self, phase: ScanPhase, clear_snapshot: bool) -> Result<()> {
        self.detach();
        self.set_phase(phase);

        if let Some(id) = self.snapshot_id.take() {
            if clear_snapshot {
                self.stores.resume.complete(&id).await?;
            } else {
                debug!(job = %id, "Keeping resume checkpoint");
                self.pending_resume = self
                    .stores
                    .resume
                    .find_pending(self.account_id(), OperationKind::Scan)
                    .await?
                    .filter(|snapshot| snapshot.id == id);
            }
        }
        self.stores.cache.save(self.reconciler.state()).await?;
        self.claim = None;
        Ok(())
    }

    fn set_phase(&mut self, phase: ScanPhase) {
        let state = self.reconciler.state_mut();
        if state.phase != phase {
            info!(account = %state.account_id, from = %state.phase, to = %phase, "Scan phase");
            state.phase = phase;
        }
    }
}

async fn next_event<T: EventStream>(
    stream: Option<&mut T>,
) -> chatsweep_remote::Result<Option<ScanEvent>> {
    match stream {
        Some(stream) => stream.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poll: Option<&mut Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
