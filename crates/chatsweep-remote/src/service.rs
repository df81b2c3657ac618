//! Service contracts consumed by the engine.
//!
//! The HTTP client in [`crate::http`] implements all of them; tests use
//! in-process fakes.

#![allow(async_fn_in_trait)]

use crate::Result;
use crate::types::{
    AccountId, Ack, ChatId, ConnectOutcome, DeleteAllResponse, DeleteResponse, MessageId,
    ScanEvent, ScanOptions, ScanStatus, VerifyResponse,
};

/// Ordered push stream of scan events for one account.
pub trait EventStream {
    /// Waits for the next event.
    ///
    /// Returns `Ok(None)` when the server closes the stream cleanly.
    async fn next_event(&mut self) -> Result<Option<ScanEvent>>;
}

/// Remote scan service.
pub trait ScanService {
    /// Stream type returned by [`ScanService::open_events`].
    type Stream: EventStream;

    /// Starts a scan job.
    async fn start_scan(&self, account: &AccountId, options: &ScanOptions) -> Result<Ack>;

    /// Pauses the running job.
    async fn pause_scan(&self, account: &AccountId) -> Result<Ack>;

    /// Resumes a paused job.
    async fn resume_scan(&self, account: &AccountId) -> Result<Ack>;

    /// Stops the running job.
    async fn stop_scan(&self, account: &AccountId) -> Result<Ack>;

    /// Fetches a status snapshot.
    async fn scan_status(&self, account: &AccountId) -> Result<ScanStatus>;

    /// Opens the push event stream.
    async fn open_events(&self, account: &AccountId) -> Result<Self::Stream>;
}

/// Remote delete service.
pub trait DeleteService {
    /// Requests deletion of messages in one chat.
    async fn delete_messages(
        &self,
        chat: ChatId,
        message_ids: &[MessageId],
    ) -> Result<DeleteResponse>;

    /// Checks which of the given messages are really gone.
    async fn verify_deletion(
        &self,
        chat: ChatId,
        message_ids: &[MessageId],
        time_range_minutes: u32,
    ) -> Result<VerifyResponse>;

    /// Deletes every found message of an account server-side.
    async fn delete_all_found_messages(&self, account: &AccountId) -> Result<DeleteAllResponse>;
}

/// Remote account connect service.
pub trait AccountConnector {
    /// Starts connecting an account.
    async fn connect(&self, account: &AccountId) -> Result<ConnectOutcome>;

    /// Submits a verification code received out of band.
    async fn submit_code(&self, account: &AccountId, code: &str) -> Result<ConnectOutcome>;

    /// Submits a two-factor password.
    async fn submit_password(&self, account: &AccountId, password: &str)
    -> Result<ConnectOutcome>;
}
