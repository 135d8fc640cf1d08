use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("start page must be at least 1 (got {0})")]
    StartPageTooLow(u32),
    #[error("end page {end} is before start page {start}")]
    EndBeforeStart { start: u32, end: u32 },
}

/// Page range and storage destination for one crawl job.
///
/// Serializes to the body of `POST /crawler/start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    start_page: u32,
    end_page: u32,
    #[serde(rename = "saveDrive")]
    persist_to_external_storage: bool,
}

impl CrawlConfig {
    pub fn new(
        start_page: u32,
        end_page: u32,
        persist_to_external_storage: bool,
    ) -> Result<Self, ConfigError> {
        if start_page < 1 {
            return Err(ConfigError::StartPageTooLow(start_page));
        }
        if end_page < start_page {
            return Err(ConfigError::EndBeforeStart {
                start: start_page,
                end: end_page,
            });
        }
        Ok(Self {
            start_page,
            end_page,
            persist_to_external_storage,
        })
    }

    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    pub fn end_page(&self) -> u32 {
        self.end_page
    }

    pub fn persist_to_external_storage(&self) -> bool {
        self.persist_to_external_storage
    }

    /// Number of listing pages the job will visit.
    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            start_page: 1,
            end_page: 5,
            persist_to_external_storage: false,
        }
    }
}
