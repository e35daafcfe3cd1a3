//! Slug allocation: title normalization plus a bounded uniqueness probe.

use std::future::Future;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use uuid::Uuid;

use postforge_shared::{PostforgeError, Result};

/// Default maximum slug length for the timestamped variant, before its suffix.
pub const TIMESTAMP_SLUG_MAX_LEN: usize = 50;

/// Titles shorter than this (after cleanup) get a synthetic slug.
const MIN_TITLE_CHARS: usize = 3;

/// Normalize a title into a URL-safe slug using the current time for the
/// synthetic fallback.
pub fn slugify(title: &str, max_len: usize) -> String {
    slugify_at(title, max_len, chrono::Utc::now().timestamp_millis())
}

/// Normalize `title` into a slug of at most `max_len` characters.
///
/// Lowercases, keeps ASCII letters, digits, and Hangul, turns whitespace and
/// dash/underscore runs into a single `-`, and trims dashes at both ends.
/// Titles that end up too short become `post-{now_ms}`.
pub fn slugify_at(title: &str, max_len: usize, now_ms: i64) -> String {
    static FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("valid regex"));
    static JSON_PUNCT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"[{}"\[\]]"#).expect("valid regex"));
    static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"[^a-z0-9가-힣ㄱ-ㅎㅏ-ㅣ\s_-]+").expect("valid regex")
    });
    static SEPARATOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\s_-]+").expect("valid regex"));

    let fallback = || format!("post-{now_ms}");

    // Model output sometimes leaks fences or JSON punctuation into titles
    let cleaned = FENCE_RE.replace_all(title, "");
    let cleaned = JSON_PUNCT_RE.replace_all(&cleaned, " ");
    let cleaned = cleaned.trim();
    if cleaned.chars().count() < MIN_TITLE_CHARS {
        return fallback();
    }

    let lowered = cleaned.to_lowercase();
    let kept = DISALLOWED_RE.replace_all(&lowered, "");
    let dashed = SEPARATOR_RE.replace_all(&kept, "-");
    let truncated: String = dashed.trim_matches('-').chars().take(max_len).collect();
    let slug = truncated.trim_matches('-');

    if slug.chars().count() < 2 {
        fallback()
    } else {
        slug.to_string()
    }
}

/// Probe `base`, `base-1`, `base-2`, … until `exists` reports a free slug.
///
/// At most `max_attempts` candidates are probed; past that the allocation
/// fails with [`PostforgeError::SlugExhausted`].
pub async fn ensure_unique<F, Fut>(base: &str, max_attempts: u32, mut exists: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let attempts = max_attempts.max(1);
    for n in 0..attempts {
        let candidate = if n == 0 {
            base.to_string()
        } else {
            format!("{base}-{n}")
        };
        if !exists(candidate.clone()).await? {
            if n > 0 {
                debug!(base, slug = %candidate, probes = n + 1, "slug collision resolved");
            }
            return Ok(candidate);
        }
    }

    Err(PostforgeError::SlugExhausted {
        base: base.to_string(),
        attempts,
    })
}

/// Slug with a millisecond timestamp and a random 0..999 suffix, for callers
/// that skip the existence probe. Only probabilistically unique.
pub fn timestamped_slug(title: &str, max_len: usize) -> String {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let base = slugify_at(title, max_len, now_ms);
    let nonce = Uuid::new_v4().as_u128() % 1000;
    format!("{base}-{now_ms}-{nonce}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn punctuation_is_dropped() {
        assert_eq!(slugify_at("Hello, World! #Test", 60, NOW), "hello-world-test");
    }

    #[test]
    fn hangul_is_kept() {
        assert_eq!(
            slugify_at("러닝 초보를 위한 가이드 2024", 60, NOW),
            "러닝-초보를-위한-가이드-2024"
        );
    }

    #[test]
    fn separators_collapse() {
        assert_eq!(
            slugify_at("  Rust -- async   _ traits  ", 60, NOW),
            "rust-async-traits"
        );
    }

    #[test]
    fn json_artifacts_are_stripped() {
        assert_eq!(
            slugify_at("```json {\"title\": \"Sleep Better\"}```", 60, NOW),
            "title-sleep-better"
        );
    }

    #[test]
    fn truncation_never_leaves_a_trailing_dash() {
        let slug = slugify_at("abcd efgh", 5, NOW);
        assert_eq!(slug, "abcd");
        assert!(slug.chars().count() <= 5);
    }

    #[test]
    fn short_titles_fall_back() {
        assert_eq!(slugify_at("hi", 60, NOW), format!("post-{NOW}"));
        assert_eq!(slugify_at("!!!???", 60, NOW), format!("post-{NOW}"));
    }

    #[test]
    fn timestamped_variant_has_two_numeric_suffixes() {
        let slug = timestamped_slug("Morning Routine", TIMESTAMP_SLUG_MAX_LEN);
        let parts: Vec<&str> = slug.rsplitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<u32>().unwrap() < 1000);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2], "morning-routine");
    }

    #[tokio::test]
    async fn unique_probe_appends_counter() {
        let taken: HashSet<String> = ["guide", "guide-1", "guide-2"]
            .into_iter()
            .map(String::from)
            .collect();

        let slug = ensure_unique("guide", 10, |s| {
            let hit = taken.contains(&s);
            async move { Ok(hit) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "guide-3");
    }

    #[tokio::test]
    async fn repeated_collisions_yield_distinct_slugs() {
        let taken = Arc::new(Mutex::new(HashSet::new()));

        for _ in 0..120 {
            let probe = Arc::clone(&taken);
            let slug = ensure_unique("same-title", 1000, move |s| {
                let hit = probe.lock().unwrap().contains(&s);
                async move { Ok(hit) }
            })
            .await
            .unwrap();
            assert!(taken.lock().unwrap().insert(slug));
        }

        let taken = taken.lock().unwrap();
        assert_eq!(taken.len(), 120);
        assert!(taken.contains("same-title-119"));
    }

    #[tokio::test]
    async fn probe_is_bounded() {
        let err = ensure_unique("busy", 5, |_| async { Ok(true) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PostforgeError::SlugExhausted { attempts: 5, .. }
        ));
    }

    #[tokio::test]
    async fn probe_errors_propagate() {
        let err = ensure_unique("x", 5, |_| async {
            Err(PostforgeError::Storage("gone".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PostforgeError::Storage(_)));
    }
}
