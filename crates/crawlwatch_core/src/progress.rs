/// Completion of a page-range crawl as a whole percentage in `0..=100`.
///
/// A single-page range is binary: 100 once the current page is that page, 0
/// otherwise (including pages past it). For wider ranges, pages before the
/// range count as 0 and pages after it as 100; inside the range the processed
/// share is rounded half up. An inverted range (`start_page > end_page`) yields 0.
pub fn percentage(current_page: i64, start_page: i64, end_page: i64) -> u8 {
    if start_page == end_page {
        return if current_page == start_page { 100 } else { 0 };
    }
    if start_page > end_page || current_page < start_page {
        return 0;
    }
    if current_page > end_page {
        return 100;
    }

    // Widen so extreme page numbers cannot overflow.
    let pages_to_crawl = i128::from(end_page) - i128::from(start_page) + 1;
    let pages_processed = i128::from(current_page) - i128::from(start_page) + 1;
    let rounded = (pages_processed * 200 + pages_to_crawl) / (pages_to_crawl * 2);
    rounded.clamp(0, 100) as u8
}
