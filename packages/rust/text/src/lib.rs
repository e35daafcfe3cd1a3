//! Pure text transforms used by the content pipeline.
//!
//! - [`slug`]: title normalization and bounded uniqueness probing
//! - [`segment`]: sentence-aware transcript chunking and short-form classification
//! - [`moments`]: evenly spaced key moments with player timestamps
//! - [`lang`]: language detection, hashtag extraction, and tag merging

pub mod lang;
pub mod moments;
pub mod segment;
pub mod slug;

pub use lang::{detect_language, extract_hashtags, merge_tags};
pub use moments::{KeyMoment, format_timestamp, key_moments};
pub use segment::{is_short_form, segment};
pub use slug::{TIMESTAMP_SLUG_MAX_LEN, ensure_unique, slugify, slugify_at, timestamped_slug};

/// Clip `text` to `max` characters, ending in `...` when something was cut.
pub fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Cut `text` at a char boundary at or below `max_bytes`.
pub fn truncate_to_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipsis_truncation() {
        let long = "a".repeat(120);
        let clipped = truncate_with_ellipsis(&long, 100);
        assert_eq!(clipped.chars().count(), 100);
        assert!(clipped.ends_with("..."));
        assert_eq!(truncate_with_ellipsis("short", 100), "short");
    }

    #[test]
    fn char_boundary_truncation() {
        assert_eq!(truncate_to_char_boundary("가나다", 4), "가");
        assert_eq!(truncate_to_char_boundary("abc", 10), "abc");
    }
}
