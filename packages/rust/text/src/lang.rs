//! Language detection and tag helpers for generated posts.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Share of Hangul among letters at which text counts as Korean.
const HANGUL_RATIO: f64 = 0.3;

/// Best-effort language code for `text`: `ko` or `en`.
pub fn detect_language(text: &str) -> &'static str {
    let mut letters = 0usize;
    let mut hangul = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if is_hangul(c) {
            hangul += 1;
        }
    }
    if letters > 0 && hangul as f64 / letters as f64 >= HANGUL_RATIO {
        "ko"
    } else {
        "en"
    }
}

fn is_hangul(c: char) -> bool {
    matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{1100}'..='\u{11FF}' | '\u{3130}'..='\u{318F}')
}

/// Up to `max` `#hashtag` words from a description, without the `#`.
pub fn extract_hashtags(text: &str, max: usize) -> Vec<String> {
    static HASHTAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"#(\w+)").expect("valid regex"));

    HASHTAG_RE
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .take(max)
        .collect()
}

/// Concatenate tag groups, dropping blanks and case-insensitive duplicates
/// (first spelling wins), and keep at most `limit`.
pub fn merge_tags<I, S>(tags: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if tag.is_empty() || !seen.insert(tag.to_lowercase()) {
            continue;
        }
        out.push(tag.to_string());
        if out.len() == limit {
            break;
        }
    }
    out
}
