use crate::{CrawlConfig, SessionHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartCrawl { config: CrawlConfig },
    Subscribe { session: SessionHandle },
    ReleaseSubscription,
    FetchStatus { session: SessionHandle },
    StopCrawl {
        session: SessionHandle,
        reason: StopReason,
    },
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator pressed stop.
    Operator,
    /// Tracking view went away while the job was still running.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Failure,
}

/// A one-shot message for the operator's presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub text: String,
}

impl Notification {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Failure,
            text: text.into(),
        }
    }
}
