use crate::{CrawlConfig, ProgressFrame, SessionHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Operator edited the page range or storage flag.
    ConfigChanged(CrawlConfig),
    /// Push channel finished a handshake (`true`) or dropped (`false`).
    ConnectionChanged { connected: bool },
    /// A handshake attempt or live connection failed; a retry is pending.
    ConnectionFailed { message: String },
    /// Operator asked to start a crawl with the current config.
    StartRequested,
    StartSucceeded { session: SessionHandle },
    StartFailed { message: String },
    /// Operator asked to stop the tracked crawl.
    StopRequested,
    StopSucceeded { session: SessionHandle },
    StopFailed {
        session: SessionHandle,
        message: String,
    },
    /// A decoded frame arrived on the topic bound to `session`.
    FrameReceived {
        session: SessionHandle,
        frame: ProgressFrame,
    },
    /// Status fetched over HTTP after a reconnect; may be older than pushed frames.
    SnapshotReceived {
        session: SessionHandle,
        frame: ProgressFrame,
    },
    /// Binding the topic for `session` was refused (channel down).
    SubscribeFailed { session: SessionHandle },
    /// The tracking view is being torn down.
    ViewClosed,
}
