//! Core domain types for the content pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PostforgeError;

// ---------------------------------------------------------------------------
// PostId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for post identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

impl PostId {
    /// Generate a new time-sortable post identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PostId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// What kind of external unit a [`SourceItem`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Video,
    Topic,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Topic => "topic",
        }
    }
}

/// Normalized metadata as returned by a source adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Channel name for videos, author or category for topics.
    #[serde(default)]
    pub channel_or_author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    /// Seed keywords (topics only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// The external unit of work. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Idempotency key: the video id, or a synthetic key for topics.
    pub source_id: String,
    pub kind: SourceKind,
    pub metadata: SourceMetadata,
}

impl SourceItem {
    pub fn duration_seconds(&self) -> Option<u64> {
        self.metadata.duration_seconds
    }
}

/// One timed caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    /// Seconds from the start of the video.
    pub start_time: f64,
    #[serde(default)]
    pub duration: f64,
}

/// A full caption track in playback order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// All segment texts joined by single spaces, internal whitespace collapsed.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .flat_map(|s| s.text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// End of the last caption, in whole seconds.
    pub fn duration_seconds(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.start_time + s.duration)
            .fold(0.0_f64, f64::max)
            .round() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }
}

/// A bounded slice of transcript text. Offsets are byte offsets into the
/// text the segmenter was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A topic prompt from the daily topic pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSeed {
    pub prompt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category: String,
}

// ---------------------------------------------------------------------------
// Generated content
// ---------------------------------------------------------------------------

/// The typed content object required before persistence. Every field is
/// always populated, either by a successful parse or by the fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedContent {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub tags: Vec<String>,
    pub seo_title: String,
    pub seo_description: String,
}

// ---------------------------------------------------------------------------
// Promotional catalog
// ---------------------------------------------------------------------------

/// A catalog entry that may be linked from generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionalItem {
    pub id: String,
    pub name: String,
    pub target_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Deterministic keyword-overlap score, in `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScore {
    pub item_id: String,
    pub score: u32,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// Publication state of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl std::str::FromStr for PostStatus {
    type Err = PostforgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(PostforgeError::validation(format!(
                "unknown post status '{other}'"
            ))),
        }
    }
}

/// The durable artifact. Created once per distinct `source_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub tags: Vec<String>,
    pub status: PostStatus,
    /// Two-letter language code (`ko`, `en`).
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub seo_title: String,
    pub seo_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A post rendered into another locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub post_id: PostId,
    pub locale: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub seo_title: String,
    pub seo_description: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, start: f64, duration: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.into(),
            start_time: start,
            duration,
        }
    }

    #[test]
    fn post_id_roundtrip() {
        let id = PostId::new();
        let parsed: PostId = id.to_string().parse().expect("parse PostId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn transcript_full_text_collapses_whitespace() {
        let t = Transcript {
            segments: vec![
                segment("hello\n  there", 0.0, 1.5),
                segment(" general   kenobi ", 1.5, 2.0),
            ],
        };
        assert_eq!(t.full_text(), "hello there general kenobi");
    }

    #[test]
    fn transcript_duration_is_last_caption_end() {
        let t = Transcript {
            segments: vec![segment("a", 0.0, 4.0), segment("b", 110.2, 4.5)],
        };
        assert_eq!(t.duration_seconds(), 115);
        assert_eq!(Transcript::default().duration_seconds(), 0);
    }

    #[test]
    fn blank_transcript_is_empty() {
        let t = Transcript {
            segments: vec![segment("  ", 0.0, 1.0)],
        };
        assert!(t.is_empty());
    }

    #[test]
    fn parsed_content_uses_camel_case() {
        let content = ParsedContent {
            title: "t".into(),
            excerpt: "e".into(),
            content: "c".into(),
            tags: vec!["a".into()],
            seo_title: "st".into(),
            seo_description: "sd".into(),
        };
        let json = serde_json::to_string(&content).expect("serialize");
        assert!(json.contains("\"seoTitle\""));
        assert!(json.contains("\"seoDescription\""));
    }

    #[test]
    fn post_status_parses() {
        assert_eq!("draft".parse::<PostStatus>().unwrap(), PostStatus::Draft);
        assert!("archived".parse::<PostStatus>().is_err());
    }
}
