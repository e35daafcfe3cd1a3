//! Scheduled publishing: promote drafts whose time has come.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use postforge_shared::{Post, PostStatus, Result};
use postforge_storage::Storage;

/// Publish every draft scheduled at or before `now`. Returns the promoted posts.
#[instrument(skip(storage))]
pub async fn publish_due(storage: &Storage, now: DateTime<Utc>) -> Result<Vec<Post>> {
    let due = storage.due_scheduled(now).await?;
    let mut published = Vec::with_capacity(due.len());

    for mut post in due {
        storage.publish_post(&post.id, now).await?;
        post.status = PostStatus::Published;
        post.published_at = Some(now);
        info!(slug = %post.slug, "scheduled post published");
        published.push(post);
    }

    Ok(published)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::testing::{sample_post, temp_storage};

    #[tokio::test]
    async fn only_due_drafts_are_published() {
        let storage = temp_storage().await;
        let now = Utc::now();

        let mut due = sample_post("due", "en");
        due.scheduled_at = Some(now - Duration::minutes(5));
        let mut future = sample_post("future", "en");
        future.scheduled_at = Some(now + Duration::hours(3));
        storage.upsert_post(&due).await.unwrap();
        storage.upsert_post(&future).await.unwrap();

        let published = publish_due(&storage, now).await.unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].slug, "due");
        assert_eq!(published[0].status, PostStatus::Published);

        let stored = storage.get_post(&future.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Draft);

        assert!(publish_due(&storage, now).await.unwrap().is_empty());
    }
}
