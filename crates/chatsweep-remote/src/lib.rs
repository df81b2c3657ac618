//! # chatsweep-remote
//!
//! Typed contract for the remote services a chatsweep engine drives, plus a
//! reference HTTP binding.
//!
//! ## Features
//!
//! - **Wire model**: scan commands, status snapshots, push events, delete and
//!   verification payloads, connect outcomes
//! - **Service traits**: [`ScanService`], [`EventStream`], [`DeleteService`],
//!   [`AccountConnector`]; the engine depends only on these
//! - **Sans-I/O SSE framing**: [`EventFramer`] turns arbitrary byte chunks into
//!   ordered [`ScanEvent`]s
//! - **HTTP client**: [`HttpClient`] implements every trait with `reqwest`
//!
//! ## Quick Start
//!
//! ```ignore
//! use chatsweep_remote::{AccountId, ClientConfig, EventStream, HttpClient, ScanOptions, ScanService};
//!
//! #[tokio::main]
//! async fn main() -> chatsweep_remote::Result<()> {
//!     let client = HttpClient::new(ClientConfig::new("https://scanner.example.com/api/"))?;
//!     let account = AccountId::new("main");
//!
//!     client.start_scan(&account, &ScanOptions::default()).await?;
//!
//!     let mut events = client.open_events(&account).await?;
//!     while let Some(event) = events.next_event().await? {
//!         println!("{}", event.name());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod http;
pub mod service;
pub mod sse;
pub mod types;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use http::{HttpClient, HttpEventStream};
pub use service::{AccountConnector, DeleteService, EventStream, ScanService};
pub use sse::{EventFramer, ReaderEventStream, SseFrame, decode_frame};
pub use types::{
    AccountId, Ack, ChatDeleteResult, ChatId, ConnectOutcome, DeleteAllResponse, DeleteResponse,
    MessageDeleteResult, MessageId, RemoteChatStatus, RemotePhase, ScanEvent, ScanOptions,
    ScanStatus, ScannedChat, VerifyResponse,
};
