//! Transcript segmentation into bounded, ordered chunks.
//!
//! Chunks break at sentence ends (`.`, `!`, `?` followed by whitespace) and
//! only fall back to word or character boundaries when a single sentence is
//! longer than the limit. Each chunk is an exact slice of the input, so the
//! gaps between consecutive chunks contain only whitespace.

use postforge_shared::TranscriptChunk;

/// Whether a source of this length gets the short-form treatment.
pub fn is_short_form(duration_seconds: u64, threshold_seconds: u64) -> bool {
    duration_seconds < threshold_seconds
}

/// Split `text` into chunks of at most `max_chunk_chars` characters.
///
/// Returns a single chunk when the trimmed text fits, and no chunks for
/// blank input.
pub fn segment(text: &str, max_chunk_chars: usize) -> Vec<TranscriptChunk> {
    let max = max_chunk_chars.max(1);
    let pieces: Vec<(usize, usize)> = sentence_spans(text)
        .into_iter()
        .flat_map(|span| split_oversized(text, span, max))
        .collect();

    let mut chunks = Vec::new();
    let mut current: Option<(usize, usize, usize)> = None; // (start, end, chars)

    for (start, end) in pieces {
        current = match current {
            None => Some((start, end, text[start..end].chars().count())),
            Some((c_start, c_end, c_chars)) => {
                let added = text[c_end..end].chars().count();
                if c_chars + added > max {
                    push_chunk(&mut chunks, text, c_start, c_end);
                    Some((start, end, text[start..end].chars().count()))
                } else {
                    Some((c_start, end, c_chars + added))
                }
            }
        };
    }

    if let Some((c_start, c_end, _)) = current {
        push_chunk(&mut chunks, text, c_start, c_end);
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<TranscriptChunk>, text: &str, start: usize, end: usize) {
    chunks.push(TranscriptChunk {
        index: chunks.len(),
        text: text[start..end].to_string(),
        start_offset: start,
        end_offset: end,
    });
}

/// Byte spans of sentences with surrounding whitespace excluded.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let s = *start.get_or_insert(i);
        let end = i + c.len_utf8();
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|(_, next)| next.is_whitespace());
        if at_boundary {
            spans.push((s, end));
            start = None;
        }
    }

    // Unterminated final sentence
    if let Some(s) = start {
        spans.push((s, text.trim_end().len()));
    }

    spans
}

/// Break a span longer than `max` characters at whitespace, or at a
/// character boundary when a single word is too long.
fn split_oversized(text: &str, (start, end): (usize, usize), max: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut pos = start;

    while pos < end {
        let rest = &text[pos..end];
        if rest.chars().count() <= max {
            out.push((pos, end));
            break;
        }

        // Byte offset just past the first `max` characters
        let window_end = rest
            .char_indices()
            .nth(max)
            .map(|(i, _)| pos + i)
            .unwrap_or(end);
        let window = &text[pos..window_end];

        let cut = window
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, _)| pos + i)
            .filter(|&i| i > pos)
            .unwrap_or(window_end);

        let piece_end = text[pos..cut].trim_end().len() + pos;
        out.push((pos, piece_end));

        // Skip the whitespace we cut on
        pos = cut
            + text[cut..end]
                .char_indices()
                .find(|(_, c)| !c.is_whitespace())
                .map(|(i, _)| i)
                .unwrap_or(end - cut);
    }

    out
}
