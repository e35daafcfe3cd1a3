//! YouTube Data API v3 + timed-text client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};
use url::Url;

use postforge_shared::{
    PostforgeError, Result, SourceMetadata, Transcript, YoutubeConfig,
};

use crate::SourceAdapter;
use crate::captions::parse_json3;
use crate::duration::parse_iso8601_duration;

// ---------------------------------------------------------------------------
// API payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    snippet: VideoSnippet,
    content_details: Option<ContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    maxres: Option<Thumbnail>,
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

impl Thumbnails {
    /// Largest available rendition.
    fn best(self) -> Option<String> {
        [self.maxres, self.high, self.medium, self.default]
            .into_iter()
            .flatten()
            .map(|t| t.url)
            .next()
    }
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Source adapter backed by the YouTube Data API and the caption endpoint.
pub struct YoutubeClient {
    http: Client,
    api_key: String,
    api_base: String,
    caption_base: String,
    caption_languages: Vec<String>,
}

impl YoutubeClient {
    pub fn new(config: &YoutubeConfig, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: crate::build_client(config.timeout_secs)?,
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            caption_base: config.caption_base.clone(),
            caption_languages: config.caption_languages.clone(),
        })
    }

    /// Most recent uploads of a channel, newest first.
    #[instrument(skip(self))]
    pub async fn list_channel_uploads(&self, channel_id: &str, max: u32) -> Result<Vec<String>> {
        let channels: ListResponse<ChannelResource> = self
            .get_json("channels", &[("part", "contentDetails"), ("id", channel_id)])
            .await?;
        let uploads = channels
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| PostforgeError::SourceNotFound(format!("channel {channel_id}")))?;

        let max_results = max.clamp(1, 50).to_string();
        let items: ListResponse<PlaylistItem> = self
            .get_json(
                "playlistItems",
                &[
                    ("part", "snippet"),
                    ("playlistId", uploads.as_str()),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        let ids: Vec<String> = items
            .items
            .into_iter()
            .filter_map(|i| i.snippet.resource_id.video_id)
            .collect();
        info!(channel_id, videos = ids.len(), "listed channel uploads");
        Ok(ids)
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut url = Url::parse(&format!("{}/{resource}", self.api_base))
            .map_err(|e| PostforgeError::config(format!("invalid YouTube API base: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("key", &self.api_key);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PostforgeError::Network(format!("youtube {resource}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PostforgeError::Network(format!("youtube {resource}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(classify_api_error(resource, status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| PostforgeError::parse(format!("youtube {resource} response: {e}")))
    }

    /// Fetch one caption track; `None` when that language has no track.
    async fn fetch_track(&self, video_id: &str, lang: Option<&str>) -> Result<Option<Transcript>> {
        let mut url = Url::parse(&self.caption_base)
            .map_err(|e| PostforgeError::config(format!("invalid caption base: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("v", video_id).append_pair("fmt", "json3");
            if let Some(lang) = lang {
                pairs.append_pair("lang", lang);
            }
        }

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PostforgeError::Network(format!("captions {video_id}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PostforgeError::RateLimited(format!("captions {video_id}: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(PostforgeError::Network(format!("captions {video_id}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PostforgeError::Network(format!("captions {video_id}: {e}")))?;
        let transcript = parse_json3(&body)?;
        Ok((!transcript.is_empty()).then_some(transcript))
    }
}

#[async_trait]
impl SourceAdapter for YoutubeClient {
    #[instrument(skip(self))]
    async fn fetch_metadata(&self, video_id: &str) -> Result<SourceMetadata> {
        let response: ListResponse<VideoResource> = self
            .get_json(
                "videos",
                &[("part", "snippet,contentDetails"), ("id", video_id)],
            )
            .await?;

        let video = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PostforgeError::SourceNotFound(video_id.to_string()))?;

        let duration_seconds = match video.content_details.and_then(|d| d.duration) {
            Some(raw) => match parse_iso8601_duration(&raw) {
                Ok(secs) => Some(secs),
                Err(e) => {
                    warn!(video_id, error = %e, "ignoring unparseable duration");
                    None
                }
            },
            None => None,
        };

        debug!(video_id, title = %video.snippet.title, ?duration_seconds, "fetched metadata");

        Ok(SourceMetadata {
            title: video.snippet.title,
            description: video.snippet.description,
            channel_or_author: video.snippet.channel_title,
            thumbnail_url: video.snippet.thumbnails.best(),
            duration_seconds,
            keywords: Vec::new(),
        })
    }

    #[instrument(skip(self))]
    async fn fetch_transcript(&self, video_id: &str) -> Result<Transcript> {
        let attempts = self
            .caption_languages
            .iter()
            .map(|l| Some(l.as_str()))
            .chain(std::iter::once(None));

        for lang in attempts {
            if let Some(transcript) = self.fetch_track(video_id, lang).await? {
                info!(
                    video_id,
                    lang = lang.unwrap_or("any"),
                    segments = transcript.segments.len(),
                    "transcript fetched"
                );
                return Ok(transcript);
            }
            debug!(video_id, lang = lang.unwrap_or("any"), "no caption track");
        }

        Err(PostforgeError::TranscriptUnavailable(video_id.to_string()))
    }
}

/// Map a non-success Data API response to the error taxonomy.
fn classify_api_error(resource: &str, status: StatusCode, body: &str) -> PostforgeError {
    let quota = body.contains("quotaExceeded") || body.contains("rateLimitExceeded");
    if status == StatusCode::TOO_MANY_REQUESTS || (status == StatusCode::FORBIDDEN && quota) {
        PostforgeError::RateLimited(format!("youtube {resource}: HTTP {status}"))
    } else if status == StatusCode::NOT_FOUND {
        PostforgeError::SourceNotFound(format!("youtube {resource}"))
    } else {
        PostforgeError::Network(format!("youtube {resource}: HTTP {status}"))
    }
}
