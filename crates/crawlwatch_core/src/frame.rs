use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{CrawlStatus, SessionHandle};

#[derive(Debug, Error)]
#[error("malformed progress frame: {0}")]
pub struct FrameDecodeError(#[from] serde_json::Error);

/// One server-pushed progress snapshot for a session.
///
/// Each frame is authoritative for everything it carries; the client replaces
/// its previous frame wholesale instead of merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressFrame {
    pub status: CrawlStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(
        default,
        rename = "currentComic",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_comic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_comic_chapters_processed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_comics_processed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_successful_comics: Option<u32>,
    #[serde(
        default,
        deserialize_with = "empty_object_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_completed_chapter: Option<ChapterSummary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<ItemError>,
    #[serde(default, rename = "details", skip_serializing_if = "Option::is_none")]
    pub detail_message: Option<String>,
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProgressFrame {
    /// A frame carrying only a status.
    pub fn new(status: CrawlStatus) -> Self {
        Self {
            status,
            session_id: None,
            current_page: None,
            total_pages: None,
            current_comic_name: None,
            current_comic_chapters_processed: None,
            total_comics_processed: None,
            total_successful_comics: None,
            last_completed_chapter: None,
            errors: Vec::new(),
            detail_message: None,
            fatal_error: None,
            timestamp: None,
        }
    }

    pub fn at_page(mut self, page: u32) -> Self {
        self.current_page = Some(page);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterSummary {
    pub comic_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub chapter_number: String,
    pub chapter_title: String,
    pub image_count: u32,
}

/// A per-comic failure reported inside a frame. Display only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemError {
    #[serde(rename = "comicSlug")]
    pub item_identifier: String,
    #[serde(rename = "error")]
    pub error_message: String,
}

pub fn decode_frame(payload: &str) -> Result<ProgressFrame, FrameDecodeError> {
    Ok(serde_json::from_str(payload)?)
}

// The server sends `{}` for "no chapter finished yet".
fn empty_object_as_none<'de, D>(deserializer: D) -> Result<Option<ChapterSummary>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) if map.is_empty() => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(de::Error::custom),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(de::Error::custom(format!(
            "expected chapter number, got {other}"
        ))),
    }
}
