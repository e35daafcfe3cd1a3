//! Idempotency guard: at most one post per source.

use tracing::info;

use postforge_shared::{Post, Result};
use postforge_storage::Storage;

/// The post already generated from `source_id`, if any.
///
/// Called before any generation work so a duplicate never spends quota.
pub async fn check_duplicate(storage: &Storage, source_id: &str) -> Result<Option<Post>> {
    let existing = storage.find_by_source_id(source_id).await?;
    if let Some(post) = &existing {
        info!(source_id, slug = %post.slug, "source already has a post, skipping");
    }
    Ok(existing)
}
