use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a crawl job as reported by the server.
///
/// `Started -> InProgress -> {Completed | Error}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrawlStatus {
    Started,
    InProgress,
    Completed,
    Error,
}

impl CrawlStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CrawlStatus::Completed | CrawlStatus::Error)
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlStatus::Started => write!(f, "started"),
            CrawlStatus::InProgress => write!(f, "in progress"),
            CrawlStatus::Completed => write!(f, "completed"),
            CrawlStatus::Error => write!(f, "error"),
        }
    }
}
