//! HTTP binding of the service contracts.
//!
//! Commands and polls are JSON over HTTP; the event stream is
//! `text/event-stream` read chunk by chunk.

use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ClientConfig;
use crate::service::{AccountConnector, DeleteService, EventStream, ScanService};
use crate::sse::{EventFramer, decode_frame};
use crate::types::{
    AccountId, Ack, ChatId, ConnectOutcome, DeleteAllResponse, DeleteResponse, MessageId,
    ScanEvent, ScanOptions, ScanStatus, VerifyResponse,
};
use crate::{Error, Result};

/// Maximum number of body bytes kept in [`Error::Status`].
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for the scan, delete and connect services.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: ClientConfig,
    base: Url,
    http: reqwest::Client,
}

impl HttpClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            return Err(Error::Protocol(format!(
                "base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::Protocol(format!("invalid auth token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        // No global request timeout: it would cut the long-lived event stream.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { config, base, http })
    }

    /// Returns the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Builds an endpoint URL from path segments (each one percent-encoded).
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Protocol("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%url, "POST");
        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await?;
        decode_response(response).await
    }

    async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        decode_response(response).await
    }

    async fn scan_command(&self, account: &AccountId, command: &str) -> Result<Ack> {
        let url = self.endpoint(&["accounts", account.as_str(), "scan", command])?;
        let ack: Ack = self.post_json(url, &serde_json::json!({})).await?;
        ack.into_result()
    }
}

/// Checks the status code and decodes a JSON body.
async fn decode_response<T>(response: reqwest::Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(Error::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(Into::into)
}

impl ScanService for HttpClient {
    type Stream = HttpEventStream;

    async fn start_scan(&self, account: &AccountId, options: &ScanOptions) -> Result<Ack> {
        let url = self.endpoint(&["accounts", account.as_str(), "scan", "start"])?;
        let ack: Ack = self.post_json(url, options).await?;
        ack.into_result()
    }

    async fn pause_scan(&self, account: &AccountId) -> Result<Ack> {
        self.scan_command(account, "pause").await
    }

    async fn resume_scan(&self, account: &AccountId) -> Result<Ack> {
        self.scan_command(account, "resume").await
    }

    async fn stop_scan(&self, account: &AccountId) -> Result<Ack> {
        self.scan_command(account, "stop").await
    }

    async fn scan_status(&self, account: &AccountId) -> Result<ScanStatus> {
        let url = self.endpoint(&["accounts", account.as_str(), "scan", "status"])?;
        self.get_json(url).await
    }

    async fn open_events(&self, account: &AccountId) -> Result<HttpEventStream> {
        let url = self.endpoint(&["accounts", account.as_str(), "scan", "events"])?;
        tracing::debug!(%url, "Opening event stream");

        let response = tokio::time::timeout(
            self.config.request_timeout,
            self.http
                .get(url)
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| Error::Timeout(self.config.request_timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        Ok(HttpEventStream {
            response,
            framer: EventFramer::new(),
            idle_timeout: self.config.stream_idle_timeout,
        })
    }
}

impl DeleteService for HttpClient {
    async fn delete_messages(
        &self,
        chat: ChatId,
        message_ids: &[MessageId],
    ) -> Result<DeleteResponse> {
        let chat = chat.to_string();
        let url = self.endpoint(&["chats", &chat, "messages", "delete"])?;
        self.post_json(url, &serde_json::json!({ "messageIds": message_ids }))
            .await
    }

    async fn verify_deletion(
        &self,
        chat: ChatId,
        message_ids: &[MessageId],
        time_range_minutes: u32,
    ) -> Result<VerifyResponse> {
        let chat = chat.to_string();
        let url = self.endpoint(&["chats", &chat, "messages", "verify-deletion"])?;
        self.post_json(
            url,
            &serde_json::json!({
                "deletedMessageIds": message_ids,
                "timeRangeMinutes": time_range_minutes,
            }),
        )
        .await
    }

    async fn delete_all_found_messages(&self, account: &AccountId) -> Result<DeleteAllResponse> {
        let url = self.endpoint(&["accounts", account.as_str(), "messages", "delete-all-found"])?;
        self.post_json(url, &serde_json::json!({})).await
    }
}

impl AccountConnector for HttpClient {
    async fn connect(&self, account: &AccountId) -> Result<ConnectOutcome> {
        let url = self.endpoint(&["accounts", account.as_str(), "connect"])?;
        self.post_json(url, &serde_json::json!({})).await
    }

    async fn submit_code(&self, account: &AccountId, code: &str) -> Result<ConnectOutcome> {
        let url = self.endpoint(&["accounts", account.as_str(), "connect", "code"])?;
        self.post_json(url, &serde_json::json!({ "code": code }))
            .await
    }

    async fn submit_password(
        &self,
        account: &AccountId,
        password: &str,
    ) -> Result<ConnectOutcome> {
        let url = self.endpoint(&["accounts", account.as_str(), "connect", "password"])?;
        self.post_json(url, &serde_json::json!({ "password": password }))
            .await
    }
}

/// Event stream backed by a streaming HTTP response.
#[derive(Debug)]
pub struct HttpEventStream {
    response: reqwest::Response,
    framer: EventFramer,
    idle_timeout: Duration,
}

impl EventStream for HttpEventStream {
    async fn next_event(&mut self) -> Result<Option<ScanEvent>> {
        loop {
            while let Some(frame) = self.framer.next_frame()? {
                if let Some(event) = decode_frame(&frame) {
                    return Ok(Some(event));
                }
            }

            let chunk = tokio::time::timeout(self.idle_timeout, self.response.chunk())
                .await
                .map_err(|_| Error::Timeout(self.idle_timeout))??;

            match chunk {
                Some(bytes) => self.framer.push(&bytes),
                None => return Ok(None),
            }
        }
    }
}
