//! Crawlwatch core: crawl-job model, progress state machine and view-model helpers.
//!
//! Nothing in this crate performs IO. The engine feeds [`Msg`]s into [`update`]
//! and executes the returned [`Effect`]s.
mod config;
mod effect;
mod frame;
mod msg;
mod progress;
mod session;
mod state;
mod status;
mod update;
mod view_model;

pub use config::{ConfigError, CrawlConfig};
pub use effect::{Effect, Notification, NotificationLevel, StopReason};
pub use frame::{decode_frame, ChapterSummary, FrameDecodeError, ItemError, ProgressFrame};
pub use msg::Msg;
pub use progress::percentage;
pub use session::{topic_for, SessionHandle};
pub use state::{JobPhase, TrackerState};
pub use status::CrawlStatus;
pub use update::update;
pub use view_model::TrackerView;
