//! Daily batch jobs built on the scheduler: video sync, topic posts, translation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use postforge_shared::{BatchConfig, Result, TopicSeed};
use postforge_source::topic_key;

use crate::checkpoint::{CheckpointLease, CheckpointStore, FileCheckpointStore};
use crate::pipeline::{Disposition, ItemOutcome, Pipeline, SilentProgress};
use crate::scheduler::{BatchScheduler, ItemStatus, RunSummary};
use crate::translation::TranslationJob;

/// Checkpoint names of the batch jobs.
pub const VIDEO_BATCH: &str = "youtube-sync";
pub const TOPIC_BATCH: &str = "daily-posts";
pub const TRANSLATION_BATCH: &str = "translate-daily";

/// Open the checkpoint for `name` under `dir` and take its lease.
pub fn open_batch(dir: &Path, name: &str) -> Result<(FileCheckpointStore, CheckpointLease)> {
    let store = FileCheckpointStore::for_batch(dir, name);
    let lease = store.lease()?;
    Ok((store, lease))
}

fn status_of(outcome: &ItemOutcome) -> ItemStatus {
    match outcome {
        ItemOutcome::Created(_) => ItemStatus::Succeeded,
        ItemOutcome::Duplicate(_) => ItemStatus::Skipped,
    }
}

/// Generate posts for the videos in `video_ids` that have none yet.
#[instrument(skip_all, fields(videos = video_ids.len()))]
pub async fn run_video_batch(
    pipeline: &Pipeline,
    video_ids: Vec<String>,
    store: &dyn CheckpointStore,
    batch: &BatchConfig,
) -> Result<RunSummary> {
    let mut pending = Vec::with_capacity(video_ids.len());
    for id in video_ids {
        if pipeline.storage().find_by_source_id(&id).await?.is_none() {
            pending.push(id);
        }
    }
    info!(pending = pending.len(), "videos without a post");

    let disposition = if batch.auto_publish {
        Disposition::Publish
    } else {
        Disposition::Draft
    };
    let scheduler = BatchScheduler::new(store, batch.limit, Duration::from_millis(batch.delay_ms));
    scheduler
        .run(pending, move |key| async move {
            let outcome = pipeline
                .process_video(&key, disposition, &SilentProgress)
                .await?;
            Ok(status_of(&outcome))
        })
        .await
}

/// Generate up to `posts_per_day` topic posts, scheduled
/// `hours_between_posts` apart starting one interval after `now`.
#[instrument(skip_all, fields(topics = seeds.len()))]
pub async fn run_topic_batch(
    pipeline: &Pipeline,
    seeds: Vec<TopicSeed>,
    store: &dyn CheckpointStore,
    batch: &BatchConfig,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let mut by_key = HashMap::new();
    let mut keys = Vec::new();
    for seed in seeds {
        let key = topic_key(&seed.prompt);
        if by_key.contains_key(&key) || pipeline.storage().find_by_source_id(&key).await?.is_some() {
            continue;
        }
        keys.push(key.clone());
        by_key.insert(key, seed);
    }
    info!(pending = keys.len(), "topics without a post");

    let created = AtomicUsize::new(0);
    let by_key = &by_key;
    let created = &created;
    let scheduler = BatchScheduler::new(
        store,
        batch.posts_per_day,
        Duration::from_millis(batch.delay_ms),
    );
    scheduler
        .run(keys, move |key| async move {
            let Some(seed) = by_key.get(&key) else {
                return Ok(ItemStatus::Skipped);
            };
            let disposition = if batch.auto_publish {
                Disposition::Publish
            } else {
                let slot = created.load(Ordering::SeqCst) as i64 + 1;
                Disposition::ScheduleAt(now + chrono::Duration::hours(batch.hours_between_posts * slot))
            };
            let outcome = pipeline
                .process_topic(seed, disposition, &SilentProgress)
                .await?;
            if matches!(outcome, ItemOutcome::Created(_)) {
                created.fetch_add(1, Ordering::SeqCst);
            }
            Ok(status_of(&outcome))
        })
        .await
}

/// Translate published posts that lack their counterpart locale.
#[instrument(skip_all)]
pub async fn run_translation_batch(
    job: &TranslationJob,
    store: &dyn CheckpointStore,
    batch: &BatchConfig,
) -> Result<RunSummary> {
    let keys = job.work_list().await?;
    info!(pending = keys.len(), "translations missing");

    let scheduler = BatchScheduler::new(store, batch.limit, Duration::from_millis(batch.delay_ms));
    scheduler
        .run(keys, move |key| async move { job.translate_key(&key).await })
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postforge_shared::{PostStatus, PostforgeError};

    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::scheduler::RunState;
    use crate::testing::{
        FakeSource, ScriptedGenerator, batch_config, build_pipeline, simple_transcript,
        simple_video, temp_storage,
    };

    const FINISHED: &str = r#"{"title": "A finished post", "content": "Body text for the post."}"#;

    #[tokio::test]
    async fn video_batch_skips_existing_and_respects_limit() {
        let storage = Arc::new(temp_storage().await);
        let mut source = FakeSource::default();
        for id in ["v1", "v2", "v3"] {
            source = source.and_video(id, simple_video(id), simple_transcript());
        }
        let pipeline = build_pipeline(
            storage.clone(),
            Arc::new(source),
            Arc::new(ScriptedGenerator::always(FINISHED)),
        );
        let store = MemoryCheckpointStore::default();
        let mut batch = batch_config();
        batch.limit = 2;

        let ids = vec!["v1".to_string(), "v2".to_string(), "v3".to_string()];
        let summary = run_video_batch(&pipeline, ids.clone(), &store, &batch)
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.remaining, 1);
        assert_eq!(store.snapshot().completed, vec!["v1", "v2"]);

        let summary = run_video_batch(&pipeline, ids, &store, &batch).await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.state, RunState::Completed);
        assert!(storage.find_by_source_id("v3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn video_batch_stops_on_quota() {
        let storage = Arc::new(temp_storage().await);
        let source = FakeSource::default()
            .and_video("v1", simple_video("v1"), simple_transcript())
            .and_video("v2", simple_video("v2"), simple_transcript());
        // v1 needs a draft and a finishing call; v2's first call hits the quota
        let generator = ScriptedGenerator::new(vec![
            Ok(FINISHED.into()),
            Ok(FINISHED.into()),
            Err(PostforgeError::RateLimited("429".into())),
        ]);
        let pipeline = build_pipeline(storage, Arc::new(source), Arc::new(generator));
        let store = MemoryCheckpointStore::default();

        let summary = run_video_batch(
            &pipeline,
            vec!["v1".into(), "v2".into()],
            &store,
            &batch_config(),
        )
        .await
        .unwrap();
        assert_eq!(summary.state, RunState::QuotaExhausted);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.stopped_at.as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn missing_video_is_attempted_once() {
        let storage = Arc::new(temp_storage().await);
        let source = Arc::new(FakeSource::with_video("v1", simple_video("v1"), simple_transcript()));
        let pipeline = build_pipeline(
            storage,
            source.clone(),
            Arc::new(ScriptedGenerator::always(FINISHED)),
        );
        let store = MemoryCheckpointStore::default();
        let mut batch = batch_config();
        batch.limit = 1;

        let ids = vec!["gone".to_string(), "v1".to_string()];
        let first = run_video_batch(&pipeline, ids.clone(), &store, &batch).await.unwrap();
        assert_eq!(first.failed.len(), 1);
        assert!(first.failed[0].terminal);

        let second = run_video_batch(&pipeline, ids, &store, &batch).await.unwrap();
        assert_eq!(second.succeeded, 1);
        assert!(second.failed.is_empty());
        assert_eq!(source.metadata_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn topic_batch_spaces_schedule() {
        let storage = Arc::new(temp_storage().await);
        let pipeline = build_pipeline(
            storage.clone(),
            Arc::new(FakeSource::default()),
            Arc::new(ScriptedGenerator::always(FINISHED)),
        );
        let seeds: Vec<TopicSeed> = ["Topic one", "Topic two", "Topic three"]
            .iter()
            .map(|p| TopicSeed {
                prompt: (*p).into(),
                keywords: Vec::new(),
                category: String::new(),
            })
            .collect();
        let mut batch = batch_config();
        batch.posts_per_day = 2;
        batch.hours_between_posts = 2;
        let now = Utc::now();

        let summary = run_topic_batch(&pipeline, seeds, &MemoryCheckpointStore::default(), &batch, now)
            .await
            .unwrap();
        assert_eq!(summary.succeeded, 2);

        let first = storage
            .find_by_source_id(&topic_key("Topic one"))
            .await
            .unwrap()
            .unwrap();
        let second = storage
            .find_by_source_id(&topic_key("Topic two"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, PostStatus::Draft);
        let first_at = first.scheduled_at.unwrap();
        let second_at = second.scheduled_at.unwrap();
        assert!((first_at - now - chrono::Duration::hours(2)).num_seconds().abs() <= 1);
        assert!((second_at - now - chrono::Duration::hours(4)).num_seconds().abs() <= 1);
        assert!(storage.find_by_source_id(&topic_key("Topic three")).await.unwrap().is_none());
    }

    #[test]
    fn lease_blocks_a_second_batch() {
        let dir = std::env::temp_dir().join(format!("pf_jobs_{}", uuid::Uuid::now_v7()));
        let (_store, _lease) = open_batch(&dir, VIDEO_BATCH).unwrap();
        let err = open_batch(&dir, VIDEO_BATCH).unwrap_err();
        assert!(matches!(err, PostforgeError::Conflict(_)));
        assert!(open_batch(&dir, TOPIC_BATCH).is_ok());
    }
}
