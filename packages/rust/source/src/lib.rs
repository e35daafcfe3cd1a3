//! Source adapters: where pipeline input comes from.
//!
//! A video source is fetched through [`YoutubeClient`] (metadata from the
//! Data API, captions from the timed-text endpoint). A topic prompt needs no
//! network access and becomes a [`SourceItem`](postforge_shared::SourceItem)
//! through [`topic_source`].

mod captions;
mod duration;
mod topic;
mod youtube;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use postforge_shared::{PostforgeError, Result, SourceMetadata, Transcript};

pub use topic::{load_topic_pool, topic_key, topic_source};
pub use youtube::YoutubeClient;

/// User-Agent string for outbound source requests.
const USER_AGENT: &str = concat!("postforge/", env!("CARGO_PKG_VERSION"));

/// Fetches normalized metadata and transcripts for a source id.
///
/// Implementations perform no side effects beyond outbound requests.
/// `SourceNotFound` and `TranscriptUnavailable` are terminal for the source
/// and must stay distinct from transient `Network` errors.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_metadata(&self, source_id: &str) -> Result<SourceMetadata>;

    async fn fetch_transcript(&self, source_id: &str) -> Result<Transcript>;
}

/// Build a reqwest client with the shared user agent and a request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PostforgeError::Network(format!("failed to build HTTP client: {e}")))
}
