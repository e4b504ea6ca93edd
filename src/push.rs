//! Optional push channel carrying live notification envelopes.
//!
//! The channel is a long-lived `text/event-stream` response; each event's
//! `data` is one JSON envelope. A closed or failed channel is reopened after a
//! fixed delay, forever, until the listener is stopped.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::events::ClientEvent;
use crate::http_client;

/// Envelope `type` that triggers reconciliation.
pub const NOTIFICATION_TYPE: &str = "notification";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push channel connect failed: {0}")]
    Connect(String),
    #[error("Push channel read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("Malformed push message: {0}")]
    Malformed(String),
}

/// Message pushed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PushEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub notification: Option<PushedNotification>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PushedNotification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub action_url: Option<String>,
}

impl PushEnvelope {
    pub fn parse(text: &str) -> Result<Self, PushError> {
        serde_json::from_str(text.trim()).map_err(|err| PushError::Malformed(err.to_string()))
    }

    pub fn is_notification(&self) -> bool {
        self.kind == NOTIFICATION_TYPE
    }
}

/// Opens push streams.
pub trait PushConnector: Send {
    fn connect(&mut self, url: &str) -> Result<Box<dyn PushStream>, PushError>;
}

/// An open push stream.
pub trait PushStream: Send {
    /// Next message, or `None` once the server closed the stream.
    fn next_message(&mut self) -> Result<Option<String>, PushError>;
}

/// Connector for server-sent events over the streaming `ureq` agent.
#[derive(Clone, Debug, Default)]
pub struct EventStreamConnector {
    cookie_header: Option<String>,
}

impl EventStreamConnector {
    pub fn new(cookie_header: Option<String>) -> Self {
        Self { cookie_header }
    }
}

impl PushConnector for EventStreamConnector {
    fn connect(&mut self, url: &str) -> Result<Box<dyn PushStream>, PushError> {
        let mut request = http_client::streaming_agent()
            .get(url)
            .set("Accept", "text/event-stream")
            .set("X-Requested-With", "XMLHttpRequest");
        if let Some(cookie) = &self.cookie_header {
            request = request.set("Cookie", cookie);
        }
        let response = request
            .call()
            .map_err(|err| PushError::Connect(err.to_string()))?;
        Ok(Box::new(EventStream::new(response.into_reader())))
    }
}

/// Line-oriented event-stream decoder.
pub struct EventStream<R> {
    reader: BufReader<R>,
}

impl<R: Read> EventStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    fn read_event(&mut self) -> Result<Option<String>, PushError> {
        let mut data: Option<String> = None;
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                // An unterminated trailing event is dropped.
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if let Some(data) = data.take() {
                    return Ok(Some(data));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            if field == "data" {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                }
            }
        }
    }
}

impl<R: Read + Send> PushStream for EventStream<R> {
    fn next_message(&mut self) -> Result<Option<String>, PushError> {
        self.read_event()
    }
}

/// Lifecycle notifications from the listener loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushEvent {
    Opened,
    Message(String),
    Closed,
}

/// Connect, forward messages, and reconnect after `delay` whenever the
/// channel closes or fails to open.
///
/// `wait` sleeps between attempts and returns `false` to stop; `sink` returns
/// `false` when nobody listens anymore.
pub fn run_listener(
    url: &str,
    connector: &mut dyn PushConnector,
    delay: Duration,
    mut wait: impl FnMut(Duration) -> bool,
    mut sink: impl FnMut(PushEvent) -> bool,
) {
    loop {
        match connector.connect(url) {
            Ok(mut stream) => {
                info!("Push channel open at {url}");
                if !sink(PushEvent::Opened) {
                    return;
                }
                loop {
                    match stream.next_message() {
                        Ok(Some(message)) => {
                            if !sink(PushEvent::Message(message)) {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            warn!("{err}");
                            break;
                        }
                    }
                }
            }
            Err(err) => warn!("{err}"),
        }
        if !sink(PushEvent::Closed) {
            return;
        }
        debug!("Reconnecting push channel in {} ms", delay.as_millis());
        if !wait(delay) {
            return;
        }
    }
}

/// Background push listener. Dropping the handle stops reconnecting; a
/// stream that is currently open stays until it closes.
#[derive(Debug)]
pub struct PushHandle {
    url: String,
    _stop: Sender<()>,
}

impl PushHandle {
    pub fn spawn(
        url: String,
        mut connector: Box<dyn PushConnector>,
        delay: Duration,
        events: Sender<ClientEvent>,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread_url = url.clone();
        let spawned = thread::Builder::new()
            .name("notification-push".to_string())
            .spawn(move || {
                run_listener(
                    &thread_url,
                    connector.as_mut(),
                    delay,
                    |delay| matches!(stop_rx.recv_timeout(delay), Err(RecvTimeoutError::Timeout)),
                    |event| {
                        let event = match event {
                            PushEvent::Opened => ClientEvent::PushOpened,
                            PushEvent::Message(text) => ClientEvent::PushMessage(text),
                            PushEvent::Closed => ClientEvent::PushClosed,
                        };
                        events.send(event).is_ok()
                    },
                );
                debug!("Push listener for {thread_url} stopped");
            });
        if let Err(err) = spawned {
            warn!("Failed to start push listener: {err}");
        }
        Self { url, _stop: stop_tx }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
