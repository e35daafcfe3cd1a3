//! Prompt templates for the draft, finishing, topic, and translation calls.

use postforge_shared::{SourceKind, SourceMetadata};

/// Shared voice instructions prepended to every article prompt.
const SYSTEM_VOICE: &str = "You are an experienced blog writer. Write in a clear, \
personal voice, remove filler words and repetition, and make every section \
useful to a reader who has not seen the source material.";

/// Which slice of a source one draft call covers.
#[derive(Debug, Clone, Copy)]
pub(crate) enum DraftPart {
    Whole,
    Chunk { index: usize, total: usize },
}

fn duration_text(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) if s >= 60 => format!("{} min {} s", s / 60, s % 60),
        Some(s) => format!("{s} s"),
        None => "unknown".into(),
    }
}

/// Draft prompt for one transcript chunk (or the whole transcript).
pub(crate) fn transcript_draft(
    metadata: &SourceMetadata,
    text: &str,
    part: DraftPart,
    is_short: bool,
) -> String {
    let scope = match part {
        DraftPart::Whole => "the complete transcript".to_string(),
        DraftPart::Chunk { index, total } => format!("part {} of {total}", index + 1),
    };
    let short_rules = if is_short {
        "\nThis is a short-form video. Do not add a timestamp section. Expand the \
         ideas into a self-contained post of at least 1000 characters with an \
         introduction, main content, insights, and a conclusion.\n"
    } else {
        ""
    };

    format!(
        "{SYSTEM_VOICE}

VIDEO INFORMATION:
- Title: {title}
- Channel: {channel}
- Duration: {duration}

TRANSCRIPT TO CONVERT ({scope}):
{text}

TASK:
1. Turn the transcript into a well-structured blog post with headings and paragraphs.
2. Keep the speaker's key insights and quote them where it helps.
3. Open with a hook and close with key takeaways.
{short_rules}",
        title = metadata.title,
        channel = metadata.channel_or_author,
        duration = duration_text(metadata.duration_seconds),
    )
}

/// Single-call prompt for a topic source.
pub(crate) fn topic_draft(metadata: &SourceMetadata) -> String {
    let keywords = if metadata.keywords.is_empty() {
        String::new()
    } else {
        format!("\nKEYWORDS: {}", metadata.keywords.join(", "))
    };
    let category = if metadata.channel_or_author.is_empty() {
        String::new()
    } else {
        format!("\nCATEGORY: {}", metadata.channel_or_author)
    };

    format!(
        "{SYSTEM_VOICE}

TOPIC: {topic}{keywords}{category}

Write an in-depth, practical blog post on this topic in Markdown, with an \
introduction, several sections with headings, concrete examples, and a \
conclusion with key takeaways.",
        topic = metadata.title,
    )
}

/// Finishing prompt asking for the structured JSON object.
pub(crate) fn finishing(
    kind: SourceKind,
    source_id: &str,
    metadata: &SourceMetadata,
    draft: &str,
    is_short: bool,
) -> String {
    let source_info = match kind {
        SourceKind::Video => format!(
            "VIDEO INFO:
- Title: {}
- Channel: {}
- Duration: {}
- Type: {}
- URL: https://www.youtube.com/watch?v={source_id}",
            metadata.title,
            metadata.channel_or_author,
            duration_text(metadata.duration_seconds),
            if is_short { "Shorts" } else { "Regular video" },
        ),
        SourceKind::Topic => format!("TOPIC: {}", metadata.title),
    };
    let tag_hint = if is_short {
        " Include \"Shorts\" as one of them."
    } else {
        ""
    };

    format!(
        "{SYSTEM_VOICE}

TASK: Turn the following draft into a final, polished blog post.

{source_info}

DRAFT CONTENT:
{draft}

REQUIREMENTS:
1. An engaging SEO-optimized title (max 100 characters).
2. A compelling 2-3 sentence excerpt.
3. Polished Markdown content with proper headings. Keep any embed marker line.
4. 3-5 relevant tags.{tag_hint}
5. An SEO title and an SEO meta description.

Respond with a single JSON object and nothing else:
{{
  \"title\": \"...\",
  \"excerpt\": \"...\",
  \"content\": \"...\",
  \"tags\": [\"...\"],
  \"seoTitle\": \"...\",
  \"seoDescription\": \"...\"
}}"
    )
}

fn language_name(locale: &str) -> &str {
    match locale {
        "ko" => "Korean",
        "en" => "English",
        other => other,
    }
}

/// Translation prompt for one field of a post.
pub(crate) fn translation(text: &str, from: &str, to: &str, field: &str) -> String {
    let markdown_rule = if field == "content" {
        "Preserve all Markdown formatting, links, and embed marker lines exactly."
    } else {
        "Return a single line."
    };
    format!(
        "Translate the following blog post {field} from {from} to {to}. \
{markdown_rule} Return only the translation, with no commentary.

{text}",
        from = language_name(from),
        to = language_name(to),
    )
}
