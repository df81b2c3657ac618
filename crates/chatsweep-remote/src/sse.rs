//! Server-Sent Events framing for the scan event stream.
//!
//! [`EventFramer`] is sans-I/O: bytes are pushed in as they arrive and
//! complete frames are pulled out. [`ReaderEventStream`] drives it from any
//! `AsyncRead`; the HTTP stream in [`crate::http`] drives it from response
//! chunks.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::service::EventStream;
use crate::types::ScanEvent;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum size of a single pending frame.
const MAX_FRAME_SIZE: usize = 1024 * 1024; // 1 MB

/// One dispatched SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Concatenated `data:` lines.
    pub data: String,
    /// Value of the `id:` field, if any.
    pub id: Option<String>,
}

/// Incremental SSE frame parser.
#[derive(Debug, Default)]
pub struct EventFramer {
    buffer: BytesMut,
    pending: SseFrame,
    has_data: bool,
}

impl EventFramer {
    /// Creates an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            ..Self::default()
        }
    }

    /// Appends received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Gives mutable access to the receive buffer for `read_buf`.
    pub const fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Pulls the next complete frame, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame grows beyond the size limit or is not
    /// valid UTF-8.
    pub fn next_frame(&mut self) -> Result<Option<SseFrame>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() + self.pending.data.len() > MAX_FRAME_SIZE {
                    return Err(Error::Protocol("event frame too large".to_string()));
                }
                return Ok(None);
            };

            let raw = self.buffer.split_to(pos + 1);
            let mut line = &raw[..pos];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = std::str::from_utf8(line)
                .map_err(|e| Error::Protocol(format!("invalid UTF-8 in event stream: {e}")))?;

            if line.is_empty() {
                if self.has_data {
                    self.has_data = false;
                    return Ok(Some(std::mem::take(&mut self.pending)));
                }
                self.pending = SseFrame::default();
                continue;
            }

            self.apply_line(line);

            if self.pending.data.len() > MAX_FRAME_SIZE {
                return Err(Error::Protocol("event frame too large".to_string()));
            }
        }
    }

    fn apply_line(&mut self, line: &str) {
        // Comment lines are used as heartbeats.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = line.split_once(':').map_or((line, ""), |(f, v)| {
            (f, v.strip_prefix(' ').unwrap_or(v))
        });

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.has_data = true;
            }
            "id" => self.pending.id = Some(value.to_string()),
            _ => {}
        }
    }

    /// Returns true if no partial data is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && !self.has_data
    }
}

/// Decodes a frame into a scan event.
///
/// The event type comes from the JSON `type` field, or from the SSE `event:`
/// name when the payload omits it. Frames that do not decode are skipped.
#[must_use]
pub fn decode_frame(frame: &SseFrame) -> Option<ScanEvent> {
    let mut value: serde_json::Value = match serde_json::from_str(&frame.data) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed event payload");
            return None;
        }
    };

    if let (Some(object), Some(name)) = (value.as_object_mut(), frame.event.as_deref())
        && !object.contains_key("type")
        && name != "message"
    {
        object.insert(
            "type".to_string(),
            serde_json::Value::String(name.to_string()),
        );
    }

    match serde_json::from_value(value) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(event = ?frame.event, error = %e, "Skipping unknown scan event");
            None
        }
    }
}

/// Event stream read from any byte source.
#[derive(Debug)]
pub struct ReaderEventStream<R> {
    reader: R,
    framer: EventFramer,
}

impl<R> ReaderEventStream<R>
where
    R: AsyncRead + Unpin,
{
    /// Wraps a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: EventFramer::new(),
        }
    }
}

impl<R> EventStream for ReaderEventStream<R>
where
    R: AsyncRead + Unpin,
{
    async fn next_event(&mut self) -> Result<Option<ScanEvent>> {
        loop {
            while let Some(frame) = self.framer.next_frame()? {
                if let Some(event) = decode_frame(&frame) {
                    return Ok(Some(event));
                }
            }

            let read = self.reader.read_buf(self.framer.buffer_mut()).await?;
            if read == 0 {
                return Ok(None);
            }
        }
    }
}
