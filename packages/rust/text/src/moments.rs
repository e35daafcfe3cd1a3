//! Evenly spaced "key moment" extraction for long-form transcripts.

use postforge_shared::Transcript;

/// Characters of caption text kept per moment.
const MOMENT_TEXT_CHARS: usize = 100;

/// A transcript position worth linking to.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyMoment {
    /// Whole seconds from the start of the video.
    pub seconds: u64,
    /// `m:ss` or `h:mm:ss`.
    pub timestamp: String,
    pub text: String,
}

/// Pick up to `max` segments spread evenly across the transcript.
pub fn key_moments(transcript: &Transcript, max: usize) -> Vec<KeyMoment> {
    let segments: Vec<_> = transcript
        .segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();
    if segments.is_empty() || max == 0 {
        return Vec::new();
    }

    let step = (segments.len() / max).max(1);
    segments
        .iter()
        .step_by(step)
        .take(max)
        .map(|segment| {
            let seconds = segment.start_time.max(0.0).floor() as u64;
            let text: String = segment.text.chars().take(MOMENT_TEXT_CHARS).collect();
            KeyMoment {
                seconds,
                timestamp: format_timestamp(seconds),
                text: format!("{}...", text.trim()),
            }
        })
        .collect()
}

/// Format seconds the way video players show them.
pub fn format_timestamp(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}
