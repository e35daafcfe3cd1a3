//! End-to-end item pipeline: source → draft → finished post.
//!
//! 1. Idempotency guard (before any network call)
//! 2. Metadata + transcript from the source adapter
//! 3. Segment, draft per chunk, add key moments and the embed marker
//! 4. Finishing pass, strict parse with fallback
//! 5. Title, slug, tags, language, promotional links
//! 6. Persist

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use postforge_shared::{
    GenerationConfig, Post, PostId, PostStatus, PostforgeError, PromoConfig, Result, SourceItem,
    SourceKind, TopicSeed, Transcript,
};
use postforge_source::{SourceAdapter, topic_source};
use postforge_storage::Storage;
use postforge_text::{
    detect_language, ensure_unique, extract_hashtags, is_short_form, key_moments, merge_tags,
    segment, slugify, truncate_with_ellipsis,
};

use crate::generation::{GenerationContext, Orchestrator};
use crate::guard::check_duplicate;
use crate::parser::{ParseContext, parse};
use crate::promo;

/// Longest stored title, ellipsis included.
pub const MAX_TITLE_CHARS: usize = 100;
/// Tags kept per post.
pub const MAX_TAGS: usize = 7;
/// Description hashtags carried into the tags.
const MAX_HASHTAGS: usize = 3;
/// Key moments listed for long-form videos.
const MAX_KEY_MOMENTS: usize = 5;
/// Leading content characters used for language detection.
const LANGUAGE_SAMPLE_CHARS: usize = 500;

/// Result of running one source through the pipeline.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Created(Post),
    /// The source already had a post; nothing was generated.
    Duplicate(Post),
}

impl ItemOutcome {
    pub fn post(&self) -> &Post {
        match self {
            Self::Created(post) | Self::Duplicate(post) => post,
        }
    }
}

/// What happens to a new post once it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Draft,
    Publish,
    ScheduleAt(DateTime<Utc>),
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the post has been stored.
    fn done(&self, post: &Post);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _post: &Post) {}
}

/// The marker line the site renderer replaces with a video player.
pub fn embed_marker(video_id: &str) -> String {
    format!("[YOUTUBE_EMBED:{video_id}]")
}

/// Everything an item run needs, shared across a batch.
pub struct Pipeline {
    storage: Arc<Storage>,
    source: Arc<dyn SourceAdapter>,
    orchestrator: Arc<Orchestrator>,
    generation: GenerationConfig,
    promo: PromoConfig,
}

impl Pipeline {
    pub fn new(
        storage: Arc<Storage>,
        source: Arc<dyn SourceAdapter>,
        orchestrator: Arc<Orchestrator>,
        generation: GenerationConfig,
        promo: PromoConfig,
    ) -> Self {
        Self {
            storage,
            source,
            orchestrator,
            generation,
            promo,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Turn one video into a post.
    #[instrument(skip_all, fields(source_id = %video_id))]
    pub async fn process_video(
        &self,
        video_id: &str,
        disposition: Disposition,
        progress: &dyn ProgressReporter,
    ) -> Result<ItemOutcome> {
        let start = Instant::now();

        progress.phase("Checking for an existing post");
        if let Some(post) = check_duplicate(&self.storage, video_id).await? {
            return Ok(ItemOutcome::Duplicate(post));
        }

        progress.phase("Fetching video metadata");
        let metadata = self.source.fetch_metadata(video_id).await?;

        progress.phase("Fetching transcript");
        let transcript = self.source.fetch_transcript(video_id).await?;
        if transcript.is_empty() {
            return Err(PostforgeError::TranscriptUnavailable(format!(
                "{video_id}: caption track is empty"
            )));
        }

        let item = SourceItem {
            source_id: video_id.to_string(),
            kind: SourceKind::Video,
            metadata,
        };
        let duration = item
            .duration_seconds()
            .unwrap_or_else(|| transcript.duration_seconds());
        let is_short = is_short_form(duration, self.generation.short_form_seconds);
        let chunks = segment(&transcript.full_text(), self.generation.max_chunk_chars);
        info!(duration, is_short, chunks = chunks.len(), "transcript segmented");

        let context = GenerationContext {
            source_id: &item.source_id,
            kind: item.kind,
            metadata: &item.metadata,
        };

        progress.phase("Drafting");
        let draft = self.orchestrator.generate(&chunks, &context, is_short).await?;
        let draft = assemble_video_draft(&draft, video_id, &transcript, is_short);

        let outcome = self
            .finish_and_store(&item, &draft, is_short, disposition, progress)
            .await?;
        info!(
            slug = %outcome.post().slug,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "video post created"
        );
        Ok(outcome)
    }

    /// Turn one topic prompt into a post.
    #[instrument(skip_all, fields(prompt = %seed.prompt))]
    pub async fn process_topic(
        &self,
        seed: &TopicSeed,
        disposition: Disposition,
        progress: &dyn ProgressReporter,
    ) -> Result<ItemOutcome> {
        let item = topic_source(seed);

        progress.phase("Checking for an existing post");
        if let Some(post) = check_duplicate(&self.storage, &item.source_id).await? {
            return Ok(ItemOutcome::Duplicate(post));
        }

        let context = GenerationContext {
            source_id: &item.source_id,
            kind: item.kind,
            metadata: &item.metadata,
        };

        progress.phase("Drafting");
        let draft = self.orchestrator.generate(&[], &context, false).await?;

        let outcome = self
            .finish_and_store(&item, &draft, false, disposition, progress)
            .await?;
        info!(source_id = %item.source_id, slug = %outcome.post().slug, "topic post created");
        Ok(outcome)
    }

    async fn finish_and_store(
        &self,
        item: &SourceItem,
        draft: &str,
        is_short: bool,
        disposition: Disposition,
        progress: &dyn ProgressReporter,
    ) -> Result<ItemOutcome> {
        let context = GenerationContext {
            source_id: &item.source_id,
            kind: item.kind,
            metadata: &item.metadata,
        };

        progress.phase("Finishing");
        let raw = self.orchestrator.finish(draft, &context, is_short).await?;
        let parsed = parse(
            &raw,
            &ParseContext {
                kind: item.kind,
                metadata: &item.metadata,
                draft,
                is_short,
            },
        );

        progress.phase("Preparing post");
        let title = truncate_with_ellipsis(parsed.title.trim(), MAX_TITLE_CHARS);

        let base_slug = slugify(&title, self.generation.slug_max_len);
        let slug = self.allocate_slug(&base_slug).await?;

        let tags = merge_tags(
            base_tags(item, is_short)
                .into_iter()
                .chain(parsed.tags.iter().cloned()),
            MAX_TAGS,
        );

        let sample: String = parsed.content.chars().take(LANGUAGE_SAMPLE_CHARS).collect();
        let language = detect_language(&format!("{title} {sample}")).to_string();

        let content = self.apply_promotions(&title, &parsed.content, &tags).await;

        let now = Utc::now();
        let (status, scheduled_at, published_at) = match disposition {
            Disposition::Draft => (PostStatus::Draft, None, None),
            Disposition::Publish => (PostStatus::Published, None, Some(now)),
            Disposition::ScheduleAt(at) => (PostStatus::Draft, Some(at), None),
        };

        let post = Post {
            id: PostId::new(),
            source_id: Some(item.source_id.clone()),
            slug,
            title,
            excerpt: parsed.excerpt,
            content,
            tags,
            status,
            language,
            cover_image: item.metadata.thumbnail_url.clone(),
            seo_title: parsed.seo_title,
            seo_description: parsed.seo_description,
            scheduled_at,
            published_at,
            created_at: now,
        };

        progress.phase("Saving");
        let outcome = self.save_post(post, &base_slug).await?;
        if let ItemOutcome::Created(post) = &outcome {
            progress.done(post);
        }
        Ok(outcome)
    }

    async fn allocate_slug(&self, base: &str) -> Result<String> {
        let storage = &self.storage;
        ensure_unique(base, self.generation.slug_max_attempts, |candidate| async move {
            storage.slug_exists(&candidate).await
        })
        .await
    }

    /// Insert the post. A concurrent run may take the slug or the source
    /// between allocation and insert; a taken source becomes a duplicate and
    /// a taken slug is allocated again once.
    async fn save_post(&self, mut post: Post, base_slug: &str) -> Result<ItemOutcome> {
        match self.storage.upsert_post(&post).await {
            Ok(()) => return Ok(ItemOutcome::Created(post)),
            Err(PostforgeError::Conflict(reason)) => {
                if let Some(source_id) = &post.source_id {
                    if let Some(existing) = check_duplicate(&self.storage, source_id).await? {
                        return Ok(ItemOutcome::Duplicate(existing));
                    }
                }
                warn!(slug = %post.slug, %reason, "slug taken while saving, allocating again");
            }
            Err(e) => return Err(e),
        }

        post.slug = self.allocate_slug(base_slug).await?;
        self.storage.upsert_post(&post).await?;
        Ok(ItemOutcome::Created(post))
    }

    /// Match and link promotional items. Failures here never fail the item.
    async fn apply_promotions(&self, title: &str, content: &str, tags: &[String]) -> String {
        let catalog = match self.storage.list_promo_items().await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "promotional catalog unavailable, skipping links");
                return content.to_string();
            }
        };
        if catalog.is_empty() {
            return content.to_string();
        }

        let scores = promo::match_items(
            title,
            content,
            tags,
            &catalog,
            self.promo.min_score,
            self.promo.max_results,
        );
        let items = promo::matched_items(&catalog, &scores);
        if !items.is_empty() {
            info!(
                matched = ?scores.iter().map(|s| (&s.item_id, s.score)).collect::<Vec<_>>(),
                "promotional links injected"
            );
        }
        promo::inject(content, &items, &self.promo.disclosure)
    }
}

/// Tags every post of this source gets ahead of the generated ones.
fn base_tags(item: &SourceItem, is_short: bool) -> Vec<String> {
    let metadata = &item.metadata;
    let mut tags = Vec::new();
    match item.kind {
        SourceKind::Video => {
            tags.push("YouTube".to_string());
            if is_short {
                tags.push("Shorts".to_string());
            }
            tags.push(metadata.channel_or_author.split_whitespace().collect());
            tags.extend(extract_hashtags(&metadata.description, MAX_HASHTAGS));
        }
        SourceKind::Topic => {
            tags.push(metadata.channel_or_author.clone());
            tags.extend(metadata.keywords.iter().cloned());
        }
    }
    tags
}

/// The chunk drafts plus key moments (long-form only) and the embed marker.
fn assemble_video_draft(draft: &str, video_id: &str, transcript: &Transcript, is_short: bool) -> String {
    let draft = draft.trim();
    if is_short {
        return format!(
            "{draft}\n\n## Watch the short\n\n{}",
            embed_marker(video_id)
        );
    }

    let moments: Vec<String> = key_moments(transcript, MAX_KEY_MOMENTS)
        .into_iter()
        .map(|m| {
            format!(
                "- [{}](https://www.youtube.com/watch?v={video_id}&t={}s) - {}",
                m.timestamp, m.seconds, m.text
            )
        })
        .collect();

    let mut out = draft.to_string();
    if !moments.is_empty() {
        out.push_str("\n\n## Key moments\n\n");
        out.push_str(&moments.join("\n"));
    }
    out.push_str("\n\n## Watch the video\n\n");
    out.push_str(&embed_marker(video_id));
    out
}
