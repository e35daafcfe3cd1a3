//! Topic prompts as sources: synthetic idempotency keys and the topic pool file.

use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

use postforge_shared::{
    PostforgeError, Result, SourceItem, SourceKind, SourceMetadata, TopicSeed,
};

/// Hex characters of the prompt hash used in topic keys.
const TOPIC_KEY_HEX_LEN: usize = 16;

/// Stable key for a topic prompt: `topic-<sha256 prefix>` over the
/// whitespace-normalized prompt.
pub fn topic_key(prompt: &str) -> String {
    let normalized = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    let hex = format!("{digest:x}");
    format!("topic-{}", &hex[..TOPIC_KEY_HEX_LEN])
}

/// Build the source item for a topic. Topics have no transcript; the prompt
/// stands in for the title.
pub fn topic_source(seed: &TopicSeed) -> SourceItem {
    SourceItem {
        source_id: topic_key(&seed.prompt),
        kind: SourceKind::Topic,
        metadata: SourceMetadata {
            title: seed.prompt.trim().to_string(),
            description: seed.keywords.join(", "),
            channel_or_author: seed.category.clone(),
            thumbnail_url: None,
            duration_seconds: None,
            keywords: seed.keywords.clone(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct TopicPoolFile {
    #[serde(default)]
    topics: Vec<TopicSeed>,
}

/// Load a `[[topics]]` TOML file.
pub fn load_topic_pool(path: &Path) -> Result<Vec<TopicSeed>> {
    let content = std::fs::read_to_string(path).map_err(|e| PostforgeError::io(path, e))?;
    parse_topic_pool(&content)
        .map_err(|e| PostforgeError::config(format!("topic pool {}: {e}", path.display())))
}

fn parse_topic_pool(content: &str) -> Result<Vec<TopicSeed>> {
    let file: TopicPoolFile =
        toml::from_str(content).map_err(|e| PostforgeError::config(e.to_string()))?;
    let topics: Vec<TopicSeed> = file
        .topics
        .into_iter()
        .filter(|t| !t.prompt.trim().is_empty())
        .collect();
    if topics.is_empty() {
        return Err(PostforgeError::config("no topics defined"));
    }
    Ok(topics)
}
