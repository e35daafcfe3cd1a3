//! Timed-text caption track parsing (`fmt=json3`).

use serde::Deserialize;

use postforge_shared::{PostforgeError, Result, Transcript, TranscriptSegment};

#[derive(Debug, Deserialize)]
struct Json3Track {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    #[serde(default)]
    t_start_ms: u64,
    #[serde(default)]
    d_duration_ms: u64,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

/// Parse a json3 caption body. An empty body (no track for that language)
/// yields an empty transcript rather than an error.
pub(crate) fn parse_json3(body: &str) -> Result<Transcript> {
    if body.trim().is_empty() {
        return Ok(Transcript::default());
    }

    let track: Json3Track = serde_json::from_str(body)
        .map_err(|e| PostforgeError::parse(format!("caption track: {e}")))?;

    let segments = track
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                text,
                start_time: event.t_start_ms as f64 / 1000.0,
                duration: event.d_duration_ms as f64 / 1000.0,
            })
        })
        .collect();

    Ok(Transcript { segments })
}
