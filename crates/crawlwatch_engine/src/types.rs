use crawlwatch_core::{ProgressFrame, SessionHandle};
use thiserror::Error;
use tokio::sync::mpsc;

/// Something the push channel or a subscription observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A STOMP handshake completed.
    Connected,
    /// An established connection went away.
    Disconnected,
    /// A handshake attempt or live connection failed; a retry is scheduled.
    ConnectionFailed { message: String },
    /// A decoded progress frame from the topic bound to `session`.
    Frame {
        session: SessionHandle,
        frame: ProgressFrame,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events into a tokio channel.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server sent STOMP ERROR: {message}")]
    Stomp { message: String },
    #[error("connection closed by server")]
    Closed,
    #[error("handshake timed out")]
    Timeout,
    #[error("no data from server for {0:?}")]
    HeartbeatTimeout(std::time::Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("not connected to the crawl server")]
    NotConnected,
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{message} (status {status})")]
    Rejected { status: i32, message: String },
    #[error("invalid server response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// The server acknowledged the stop command for this session.
    Stopped(SessionHandle),
    /// There was nothing to stop.
    NoActiveSession,
}
