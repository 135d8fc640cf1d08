//! Crawlwatch engine: push channel, job control and effect execution.
mod connection;
mod control;
mod stomp;
mod subscription;
mod tracker;
mod types;

pub use connection::{
    ChannelConnection, ChannelSettings, MessageHandler, StompConnection, SubscriptionId,
};
pub use control::{ControlSettings, JobControl, SessionController};
pub use stomp::{decode_frame as decode_stomp, Command, Inbound, StompError, StompFrame};
pub use subscription::ProgressSubscriber;
pub use tracker::{CrawlTracker, TrackerUpdate};
pub use types::{
    ChannelEventSink, ConnectionError, ControlError, EngineEvent, EventSink, StopOutcome,
};
