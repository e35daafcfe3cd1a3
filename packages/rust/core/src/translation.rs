//! Translation of published posts between Korean and English.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use postforge_shared::{Post, PostId, PostforgeError, Result, Translation};
use postforge_storage::Storage;

use crate::generation::Orchestrator;
use crate::prompts;
use crate::scheduler::ItemStatus;

/// `(source language, target locale)` pairs, in work-list order.
pub const TRANSLATION_PAIRS: [(&str, &str); 2] = [("ko", "en"), ("en", "ko")];

/// Work-list key for translating `post_id` into `locale`.
pub fn translation_key(post_id: &PostId, locale: &str) -> String {
    format!("{post_id}-{locale}")
}

/// Split a key back into post id and locale. The locale follows the last `-`.
pub fn parse_translation_key(key: &str) -> Result<(PostId, String)> {
    let (id, locale) = key
        .rsplit_once('-')
        .ok_or_else(|| PostforgeError::validation(format!("invalid translation key: {key}")))?;
    let id = id
        .parse()
        .map_err(|e| PostforgeError::validation(format!("invalid post id in key {key}: {e}")))?;
    Ok((id, locale.to_string()))
}

/// Translates posts through the shared generation orchestrator.
pub struct TranslationJob {
    storage: Arc<Storage>,
    orchestrator: Arc<Orchestrator>,
}

impl TranslationJob {
    pub fn new(storage: Arc<Storage>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            storage,
            orchestrator,
        }
    }

    /// Keys of every published post still missing its counterpart translation.
    pub async fn work_list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for (language, locale) in TRANSLATION_PAIRS {
            let posts = self.storage.posts_missing_translation(language, locale).await?;
            keys.extend(posts.iter().map(|p| translation_key(&p.id, locale)));
        }
        Ok(keys)
    }

    /// Translate the post named by `key`. An existing translation is a skip.
    #[instrument(skip(self))]
    pub async fn translate_key(&self, key: &str) -> Result<ItemStatus> {
        let (post_id, locale) = parse_translation_key(key)?;
        if self.storage.get_translation(&post_id, &locale).await?.is_some() {
            return Ok(ItemStatus::Skipped);
        }
        let post = self
            .storage
            .get_post(&post_id)
            .await?
            .ok_or_else(|| PostforgeError::SourceNotFound(format!("post {post_id}")))?;

        let translation = self.translate_post(&post, &locale).await?;
        self.storage.upsert_translation(&translation).await?;
        info!(post_id = %post.id, locale = %locale, "translation stored");
        Ok(ItemStatus::Succeeded)
    }

    /// Translate every text field of `post` into `locale`.
    pub async fn translate_post(&self, post: &Post, locale: &str) -> Result<Translation> {
        let from = post.language.as_str();

        let title = self.translate(&post.title, from, locale, "title").await?;
        let excerpt = self.translate(&post.excerpt, from, locale, "excerpt").await?;
        let content = self.translate(&post.content, from, locale, "content").await?;

        // SEO fields that only repeat the title/excerpt reuse their translation
        let seo_title = if post.seo_title.trim().is_empty() || post.seo_title == post.title {
            title.clone()
        } else {
            self.translate(&post.seo_title, from, locale, "SEO title").await?
        };
        let seo_description =
            if post.seo_description.trim().is_empty() || post.seo_description == post.excerpt {
                excerpt.clone()
            } else {
                self.translate(&post.seo_description, from, locale, "SEO description")
                    .await?
            };

        Ok(Translation {
            post_id: post.id.clone(),
            locale: locale.to_string(),
            title,
            excerpt,
            content,
            seo_title,
            seo_description,
            created_at: Utc::now(),
        })
    }

    async fn translate(&self, text: &str, from: &str, to: &str, field: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let prompt = prompts::translation(text, from, to, field);
        let translated = self.orchestrator.complete(&prompt).await?;
        Ok(translated.trim().to_string())
    }
}
