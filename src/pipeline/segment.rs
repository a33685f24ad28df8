//! Stage 2: split acquired text into ordered page blocks.

use crate::pipeline::acquire::{AcquiredText, PAGE_SEPARATOR};

/// Ordered page texts of one document.
///
/// Priority: per-page blocks from acquisition, then form-feed separated
/// text, then the whole text as one block. A document whose text is blank
/// overall has no pages. Individual blank pages are kept so that page
/// numbers stay aligned with the source document.
pub fn segment(acquired: &AcquiredText) -> Vec<String> {
    if acquired.is_blank() {
        return Vec::new();
    }
    if let Some(blocks) = &acquired.page_blocks {
        return blocks.clone();
    }
    if acquired.raw_text.contains(PAGE_SEPARATOR) {
        return acquired
            .raw_text
            .split(PAGE_SEPARATOR)
            .map(str::to_string)
            .collect();
    }
    vec![acquired.raw_text.clone()]
}
