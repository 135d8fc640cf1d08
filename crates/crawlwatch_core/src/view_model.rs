use crate::{ChapterSummary, CrawlConfig, CrawlStatus, ItemError, JobPhase, SessionHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerView {
    pub connected: bool,
    pub phase: JobPhase,
    /// Config of the tracked job, or the operator's draft when idle.
    pub config: CrawlConfig,
    pub session: Option<SessionHandle>,
    pub status: Option<CrawlStatus>,
    pub percentage: Option<u8>,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub current_comic: Option<String>,
    pub current_comic_chapters: Option<u32>,
    pub comics_processed: u32,
    pub comics_succeeded: u32,
    pub last_chapter: Option<ChapterSummary>,
    pub errors: Vec<ItemError>,
    pub detail: Option<String>,
    pub fatal_error: Option<String>,
    pub timestamp: Option<String>,
    pub can_start: bool,
    pub can_stop: bool,
}

impl TrackerView {
    pub fn status_label(&self) -> &'static str {
        match self.status {
            None if self.phase == JobPhase::Starting => "starting",
            None if self.session.is_some() => "waiting for first update",
            None => "not started",
            Some(CrawlStatus::Started) => "started",
            Some(CrawlStatus::InProgress) => "in progress",
            Some(CrawlStatus::Completed) => "completed",
            Some(CrawlStatus::Error) => "failed",
        }
    }
}
