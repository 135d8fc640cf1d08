use chrono::{DateTime, Local};
use crawlwatch_core::{ChapterSummary, Notification, NotificationLevel, ProgressFrame, TrackerView};

const BAR_WIDTH: usize = 20;

/// One line summarising the tracker; printed whenever the view changes.
pub fn status_line(view: &TrackerView) -> String {
    let link = if view.connected { "online" } else { "offline" };
    let mut line = format!("[{link}] {}", view.status_label());

    if let Some(session) = &view.session {
        line.push_str(&format!(" | session {session}"));
    }
    line.push_str(&format!(
        " | pages {}-{}",
        view.config.start_page(),
        view.config.end_page()
    ));
    if let Some(percent) = view.percentage {
        line.push_str(&format!(" | {} {percent:>3}%", progress_bar(percent)));
    }
    if let Some(page) = view.current_page {
        match view.total_pages {
            Some(total) => line.push_str(&format!(" | page {page}/{total}")),
            None => line.push_str(&format!(" | page {page}")),
        }
    }
    if view.comics_processed > 0 {
        line.push_str(&format!(
            " | comics {}/{} ok",
            view.comics_succeeded, view.comics_processed
        ));
    }
    if let Some(comic) = &view.current_comic {
        match view.current_comic_chapters {
            Some(chapters) => line.push_str(&format!(" | {comic} ({chapters} ch)")),
            None => line.push_str(&format!(" | {comic}")),
        }
    }
    line
}

/// Extra lines shown under the status line: last chapter, detail, item errors.
pub fn detail_lines(view: &TrackerView) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(chapter) = &view.last_chapter {
        lines.push(format!("  last chapter: {}", chapter_label(chapter)));
    }
    if let Some(detail) = &view.detail {
        lines.push(format!("  {detail}"));
    }
    if let Some(error) = &view.fatal_error {
        lines.push(format!("  error: {error}"));
    }
    if !view.errors.is_empty() {
        lines.push(format!("  {} comic(s) failed:", view.errors.len()));
        for item in &view.errors {
            lines.push(format!(
                "    - {}: {}",
                item.item_identifier, item.error_message
            ));
        }
    }
    lines
}

pub fn notice_line(notice: &Notification, at: DateTime<Local>) -> String {
    let tag = match notice.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Success => " ok ",
        NotificationLevel::Failure => "FAIL",
    };
    format!("{} [{tag}] {}", at.format("%H:%M:%S"), notice.text)
}

/// Snapshot rendering for `status <session>`, where no page range is known.
pub fn frame_lines(frame: &ProgressFrame) -> Vec<String> {
    let mut lines = vec![format!("status: {}", frame.status)];
    if let Some(session) = &frame.session_id {
        lines.push(format!("session: {session}"));
    }
    match (frame.current_page, frame.total_pages) {
        (Some(page), Some(total)) => lines.push(format!("page: {page}/{total}")),
        (Some(page), None) => lines.push(format!("page: {page}")),
        _ => {}
    }
    if let Some(processed) = frame.total_comics_processed {
        let succeeded = frame.total_successful_comics.unwrap_or(0);
        lines.push(format!("comics: {succeeded}/{processed} ok"));
    }
    if let Some(comic) = &frame.current_comic_name {
        lines.push(format!("current comic: {comic}"));
    }
    if let Some(chapter) = &frame.last_completed_chapter {
        lines.push(format!("last chapter: {}", chapter_label(chapter)));
    }
    if let Some(detail) = &frame.detail_message {
        lines.push(format!("details: {detail}"));
    }
    if let Some(error) = &frame.fatal_error {
        lines.push(format!("error: {error}"));
    }
    for item in &frame.errors {
        lines.push(format!("failed: {} ({})", item.item_identifier, item.error_message));
    }
    if let Some(timestamp) = &frame.timestamp {
        lines.push(format!("at: {timestamp}"));
    }
    lines
}

fn chapter_label(chapter: &ChapterSummary) -> String {
    let mut label = format!("{} #{}", chapter.comic_name, chapter.chapter_number);
    if !chapter.chapter_title.is_empty() {
        label.push_str(&format!(" \"{}\"", chapter.chapter_title));
    }
    label.push_str(&format!(", {} images", chapter.image_count));
    label
}

fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}
