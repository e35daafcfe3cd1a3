//! Structured output parser.
//!
//! Model output is checked against a strict schema: `title` and `content`
//! must be non-empty strings, the remaining fields are optional and get
//! defaults. Anything else (no JSON, malformed JSON, wrong types, a missing
//! required field) produces the deterministic fallback built from source
//! metadata and the draft. [`parse`] never fails.

use serde_json::{Map, Value};
use tracing::warn;

use postforge_shared::{ParsedContent, SourceKind, SourceMetadata};
use postforge_text::truncate_with_ellipsis;

/// Shortest line accepted as a "substantive" excerpt sentence.
const MIN_SENTENCE_CHARS: usize = 20;
const MAX_EXCERPT_CHARS: usize = 200;

/// Inputs the fallback is built from.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub kind: SourceKind,
    pub metadata: &'a SourceMetadata,
    /// The assembled draft, used as content when the model output is unusable.
    pub draft: &'a str,
    pub is_short: bool,
}

/// Parse the finishing-pass output into a fully populated [`ParsedContent`].
pub fn parse(raw: &str, context: &ParseContext<'_>) -> ParsedContent {
    match parse_strict(raw, context) {
        Ok(parsed) => parsed,
        Err(reason) => {
            warn!(
                title = %context.metadata.title,
                reason,
                "model output failed validation, using fallback"
            );
            fallback(context)
        }
    }
}

fn parse_strict(raw: &str, context: &ParseContext<'_>) -> Result<ParsedContent, &'static str> {
    let json = extract_json_object(raw).ok_or("no JSON object found")?;
    let value: Value = serde_json::from_str(json).map_err(|_| "malformed JSON")?;
    let obj = value.as_object().ok_or("JSON is not an object")?;

    let title = string_field(obj, &["title"]).ok_or("missing title")?;
    let content = string_field(obj, &["content", "body"]).ok_or("missing content")?;

    let excerpt = string_field(obj, &["excerpt", "summary"])
        .or_else(|| first_substantive_sentence(&content))
        .unwrap_or_else(|| default_excerpt(context));
    let tags = match tags_field(obj) {
        tags if tags.is_empty() => fallback_tags(context),
        tags => tags,
    };
    let seo_title = string_field(obj, &["seoTitle", "seo_title"]).unwrap_or_else(|| title.clone());
    let seo_description = string_field(obj, &["seoDescription", "seo_description", "metaDescription"])
        .unwrap_or_else(|| excerpt.clone());

    Ok(ParsedContent {
        title,
        excerpt,
        content,
        tags,
        seo_title,
        seo_description,
    })
}

/// Locate the outermost `{ ... }` in `raw`, ignoring code fences and prose.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Tags as an array of strings, or a comma-separated string.
fn tags_field(obj: &Map<String, Value>) -> Vec<String> {
    let tags: Vec<String> = match obj.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };
    tags.into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// The first prose sentence of Markdown `text`, skipping headings, lists,
/// quotes, and marker lines.
fn first_substantive_sentence(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with(['#', '[', '!', '|', '-', '*', '>', '`']))
        .map(|line| {
            let end = line
                .char_indices()
                .find(|&(i, c)| {
                    matches!(c, '.' | '!' | '?')
                        && line[i + c.len_utf8()..]
                            .chars()
                            .next()
                            .is_none_or(char::is_whitespace)
                })
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(line.len());
            &line[..end]
        })
        .find(|sentence| sentence.chars().count() >= MIN_SENTENCE_CHARS)
        .map(|sentence| truncate_with_ellipsis(sentence, MAX_EXCERPT_CHARS))
}

fn display_title(metadata: &SourceMetadata) -> &str {
    match metadata.title.trim() {
        "" => "Untitled post",
        title => title,
    }
}

fn default_excerpt(context: &ParseContext<'_>) -> String {
    let title = display_title(context.metadata);
    match context.kind {
        SourceKind::Topic => format!("A practical guide to {title}."),
        SourceKind::Video if context.is_short => {
            format!("The key points of the short video \"{title}\".")
        }
        SourceKind::Video => format!("The key points of the video \"{title}\"."),
    }
}

fn fallback_tags(context: &ParseContext<'_>) -> Vec<String> {
    let metadata = context.metadata;
    let mut tags: Vec<String> = match context.kind {
        SourceKind::Topic => {
            let mut tags = metadata.keywords.clone();
            tags.push("Guide".into());
            tags
        }
        SourceKind::Video => {
            let mut tags = vec!["YouTube".to_string()];
            if context.is_short {
                tags.push("Shorts".into());
            }
            tags.push("VideoSummary".into());
            tags
        }
    };

    let author: String = metadata
        .channel_or_author
        .split_whitespace()
        .collect();
    if !author.is_empty() {
        tags.push(author);
    }
    tags.retain(|t| !t.trim().is_empty());
    tags
}

/// Deterministic content built only from metadata and the draft.
pub fn fallback(context: &ParseContext<'_>) -> ParsedContent {
    let base = display_title(context.metadata);
    let title = match context.kind {
        SourceKind::Topic => base.to_string(),
        SourceKind::Video if context.is_short => format!("[Shorts summary] {base}"),
        SourceKind::Video => format!("[Video summary] {base}"),
    };

    let content = [context.draft, context.metadata.description.as_str()]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("# {base}"));

    let excerpt = match context.kind {
        SourceKind::Topic => first_substantive_sentence(&content),
        SourceKind::Video => None,
    }
    .unwrap_or_else(|| default_excerpt(context));

    let seo_description = match context.kind {
        SourceKind::Topic => excerpt.clone(),
        SourceKind::Video => {
            format!("Main points and insights from \"{base}\", summarized as a blog post.")
        }
    };

    ParsedContent {
        seo_title: format!("{base} - Key takeaways"),
        title,
        excerpt,
        content,
        tags: fallback_tags(context),
        seo_description,
    }
}
