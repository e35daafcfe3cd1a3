//! Runtime wiring shared by the one-shot commands and the trigger server.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use postforge_core::jobs::{
    TOPIC_BATCH, TRANSLATION_BATCH, VIDEO_BATCH, open_batch, run_topic_batch,
    run_translation_batch, run_video_batch,
};
use postforge_core::{
    OpenRouterClient, Orchestrator, Pipeline, RateLimiter, RunSummary, TranslationJob,
    publish_due,
};
use postforge_shared::{
    AppConfig, BatchConfig, GenerationConfig, PostforgeError, PromoConfig, Result,
    SourceMetadata, Transcript, database_path, expand_home, validate_api_key,
};
use postforge_source::{SourceAdapter, YoutubeClient, load_topic_pool};
use postforge_storage::Storage;

/// Open the configured database.
pub(crate) async fn open_storage(config: &AppConfig) -> Result<Storage> {
    Storage::open(&database_path(config)?).await
}

/// Stand-in adapter when no YouTube key is configured. Topic runs never call it.
struct NoVideoSource {
    key_env: String,
}

#[async_trait]
impl SourceAdapter for NoVideoSource {
    async fn fetch_metadata(&self, _source_id: &str) -> Result<SourceMetadata> {
        Err(self.missing())
    }

    async fn fetch_transcript(&self, _source_id: &str) -> Result<Transcript> {
        Err(self.missing())
    }
}

impl NoVideoSource {
    fn missing(&self) -> PostforgeError {
        PostforgeError::config(format!(
            "YouTube API key not found. Set the {} environment variable.",
            self.key_env
        ))
    }
}

/// Everything a generation run needs, built once from the config.
pub(crate) struct AppContext {
    pub config: AppConfig,
    pub batch: BatchConfig,
    pub storage: Arc<Storage>,
    orchestrator: Arc<Orchestrator>,
    youtube: Option<Arc<YoutubeClient>>,
}

impl AppContext {
    /// Build the context, requiring the OpenRouter key. The YouTube key is
    /// optional; video runs fail with a config error without it.
    pub async fn load(config: AppConfig) -> Result<Self> {
        let api_key = validate_api_key(&config)?;
        let client = OpenRouterClient::new(
            &config.openrouter.api_base,
            api_key,
            &config.openrouter.default_model,
            config.generation.timeout_secs,
        )?;

        let youtube = match std::env::var(&config.youtube.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                Some(Arc::new(YoutubeClient::new(&config.youtube, key)?))
            }
            _ => None,
        };

        let storage = Arc::new(open_storage(&config).await?);
        Self::from_parts(config, storage, Arc::new(client), youtube)
    }

    pub fn from_parts(
        config: AppConfig,
        storage: Arc<Storage>,
        generator: Arc<OpenRouterClient>,
        youtube: Option<Arc<YoutubeClient>>,
    ) -> Result<Self> {
        let generation = GenerationConfig::from(&config);
        let limiter = Arc::new(RateLimiter::per_minute(generation.requests_per_minute));
        let orchestrator = Arc::new(Orchestrator::new(generator, limiter, &generation));
        let batch = BatchConfig::from_app(&config)?;

        Ok(Self {
            config,
            batch,
            storage,
            orchestrator,
            youtube,
        })
    }

    fn source(&self) -> Arc<dyn SourceAdapter> {
        match &self.youtube {
            Some(client) => client.clone() as Arc<dyn SourceAdapter>,
            None => Arc::new(NoVideoSource {
                key_env: self.config.youtube.api_key_env.clone(),
            }) as Arc<dyn SourceAdapter>,
        }
    }

    fn youtube(&self) -> Result<&YoutubeClient> {
        self.youtube.as_deref().ok_or_else(|| {
            PostforgeError::config(format!(
                "YouTube API key not found. Set the {} environment variable.",
                self.config.youtube.api_key_env
            ))
        })
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.storage.clone(),
            self.source(),
            self.orchestrator.clone(),
            GenerationConfig::from(&self.config),
            PromoConfig::from(&self.config),
        )
    }

    /// Generate posts for the channel's recent uploads.
    pub async fn run_youtube_sync(&self) -> Result<RunSummary> {
        let youtube = self.youtube()?;
        let channel_id = self.config.youtube.channel_id.trim();
        if channel_id.is_empty() {
            return Err(PostforgeError::config("youtube.channel_id is not set"));
        }

        let (store, _lease) = open_batch(&self.batch.checkpoint_dir, VIDEO_BATCH)?;
        let ids = youtube
            .list_channel_uploads(channel_id, self.config.youtube.max_uploads)
            .await?;
        let summary = run_video_batch(&self.pipeline(), ids, &store, &self.batch).await?;
        log_summary(VIDEO_BATCH, &summary);
        Ok(summary)
    }

    /// Generate today's topic posts from the configured pool.
    pub async fn run_daily_posts(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let pool = self
            .config
            .batch
            .topic_pool
            .as_deref()
            .ok_or_else(|| PostforgeError::config("batch.topic_pool is not set"))?;
        let seeds = load_topic_pool(&expand_home(pool)?)?;

        let (store, _lease) = open_batch(&self.batch.checkpoint_dir, TOPIC_BATCH)?;
        let summary = run_topic_batch(&self.pipeline(), seeds, &store, &self.batch, now).await?;
        log_summary(TOPIC_BATCH, &summary);
        Ok(summary)
    }

    /// Translate published posts missing their counterpart locale.
    pub async fn run_translations(&self) -> Result<RunSummary> {
        let job = TranslationJob::new(self.storage.clone(), self.orchestrator.clone());
        let (store, _lease) = open_batch(&self.batch.checkpoint_dir, TRANSLATION_BATCH)?;
        let summary = run_translation_batch(&job, &store, &self.batch).await?;
        log_summary(TRANSLATION_BATCH, &summary);
        Ok(summary)
    }
}

/// Promote due drafts, reported as a run summary.
pub(crate) async fn publish_scheduled(storage: &Storage, now: DateTime<Utc>) -> Result<RunSummary> {
    let published = publish_due(storage, now).await?;
    info!(published = published.len(), "scheduled publishing finished");
    Ok(RunSummary {
        succeeded: published.len(),
        ..RunSummary::empty()
    })
}

fn log_summary(job: &str, summary: &RunSummary) {
    if let Some(key) = &summary.stopped_at {
        warn!(job, state = ?summary.state, stopped_at = %key, "batch stopped early");
    }
    info!(
        job,
        state = ?summary.state,
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed.len(),
        remaining = summary.remaining,
        "batch finished"
    );
}
