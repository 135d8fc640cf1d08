use crate::view_model::TrackerView;
use crate::{percentage, ChapterSummary, CrawlConfig, CrawlStatus, ProgressFrame, SessionHandle};

/// Coarse phase of the tracker, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    /// Start command in flight; no session yet.
    Starting,
    /// A session is tracked and has not reported a terminal status.
    Running,
    /// The tracked session reported `COMPLETED` or `ERROR`.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TrackedJob {
    pub(crate) session: SessionHandle,
    pub(crate) config: CrawlConfig,
    pub(crate) latest: Option<ProgressFrame>,
    pub(crate) last_chapter: Option<ChapterSummary>,
    pub(crate) terminal: bool,
    pub(crate) stop_acknowledged: bool,
    /// Set on reconnect; cleared by the first frame accepted afterwards.
    pub(crate) awaiting_snapshot: bool,
}

impl TrackedJob {
    fn status(&self) -> Option<CrawlStatus> {
        self.latest.as_ref().map(|frame| frame.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerState {
    connected: bool,
    config: CrawlConfig,
    pending_start: Option<CrawlConfig>,
    job: Option<TrackedJob>,
    closed: bool,
    dirty: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CrawlConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn config(&self) -> CrawlConfig {
        self.config
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.job.as_ref().map(|job| &job.session)
    }

    pub fn status(&self) -> Option<CrawlStatus> {
        self.job.as_ref().and_then(TrackedJob::status)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn phase(&self) -> JobPhase {
        if self.pending_start.is_some() {
            return JobPhase::Starting;
        }
        match &self.job {
            None => JobPhase::Idle,
            Some(job) if job.terminal => JobPhase::Finished,
            Some(_) => JobPhase::Running,
        }
    }

    /// Whether a new job may be started without orphaning the tracked one.
    pub fn can_start(&self) -> bool {
        if !self.connected || self.closed || self.pending_start.is_some() {
            return false;
        }
        match &self.job {
            None => true,
            Some(job) => job.terminal || job.stop_acknowledged,
        }
    }

    pub fn can_stop(&self) -> bool {
        !self.closed && matches!(&self.job, Some(job) if !job.terminal)
    }

    pub fn view(&self) -> TrackerView {
        let job = self.job.as_ref();
        let latest = job.and_then(|job| job.latest.as_ref());
        let status = latest.map(|frame| frame.status);

        let percentage = match (job, latest) {
            (Some(_), Some(frame)) if frame.status == CrawlStatus::Completed => Some(100),
            (Some(job), Some(frame)) => frame.current_page.map(|page| {
                percentage(
                    i64::from(page),
                    i64::from(job.config.start_page()),
                    i64::from(job.config.end_page()),
                )
            }),
            _ => None,
        };

        TrackerView {
            connected: self.connected,
            phase: self.phase(),
            config: job.map(|job| job.config).unwrap_or(self.config),
            session: job.map(|job| job.session.clone()),
            status,
            percentage,
            current_page: latest.and_then(|frame| frame.current_page),
            total_pages: latest.and_then(|frame| frame.total_pages),
            current_comic: latest.and_then(|frame| frame.current_comic_name.clone()),
            current_comic_chapters: latest.and_then(|frame| frame.current_comic_chapters_processed),
            comics_processed: latest
                .and_then(|frame| frame.total_comics_processed)
                .unwrap_or(0),
            comics_succeeded: latest
                .and_then(|frame| frame.total_successful_comics)
                .unwrap_or(0),
            last_chapter: job.and_then(|job| job.last_chapter.clone()),
            errors: latest.map(|frame| frame.errors.clone()).unwrap_or_default(),
            detail: latest.and_then(|frame| frame.detail_message.clone()),
            fatal_error: latest.and_then(|frame| frame.fatal_error.clone()),
            timestamp: latest.and_then(|frame| frame.timestamp.clone()),
            can_start: self.can_start(),
            can_stop: self.can_stop(),
        }
    }

    /// Returns whether anything changed since the last call and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.mark_dirty();
        }
    }

    pub(crate) fn set_config(&mut self, config: CrawlConfig) {
        if self.config != config {
            self.config = config;
            self.mark_dirty();
        }
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.mark_dirty();
    }

    /// Freezes the current config for the job about to be started.
    pub(crate) fn begin_start(&mut self) -> CrawlConfig {
        let config = self.config;
        self.pending_start = Some(config);
        self.mark_dirty();
        config
    }

    pub(crate) fn abort_start(&mut self) {
        self.pending_start = None;
        self.mark_dirty();
    }

    /// Installs `session` as the tracked job, replacing any previous one.
    pub(crate) fn track(&mut self, session: SessionHandle) {
        let config = self.pending_start.take().unwrap_or(self.config);
        self.job = Some(TrackedJob {
            session,
            config,
            latest: None,
            last_chapter: None,
            terminal: false,
            stop_acknowledged: false,
            awaiting_snapshot: false,
        });
        self.mark_dirty();
    }

    pub(crate) fn job(&self) -> Option<&TrackedJob> {
        self.job.as_ref()
    }

    pub(crate) fn job_mut(&mut self) -> Option<&mut TrackedJob> {
        self.dirty = true;
        self.job.as_mut()
    }
}
