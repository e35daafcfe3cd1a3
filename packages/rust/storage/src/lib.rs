//! Turso Embedded / libSQL persistence gateway.
//!
//! The [`Storage`] struct wraps a libSQL database holding generated posts,
//! their translations, and the promotional catalog. The `posts` table is
//! unique on both `slug` and `source_id`, which is what makes a crashed or
//! repeated pipeline run unable to create a second artifact for a source.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

use postforge_shared::{
    Post, PostId, PostStatus, PostforgeError, PromotionalItem, Result, Translation,
};

/// Column list shared by every post query, in [`row_to_post`] order.
const POST_COLUMNS: &str = "id, source_id, slug, title, excerpt, content, tags_json, status, \
     language, cover_image, seo_title, seo_description, scheduled_at, published_at, created_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PostforgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        PostforgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Posts
    // -----------------------------------------------------------------------

    /// Insert a post, or update it in place when the id already exists.
    ///
    /// A slug or source id owned by a different post fails with
    /// [`PostforgeError::Conflict`].
    pub async fn upsert_post(&self, post: &Post) -> Result<()> {
        let tags_json = serde_json::to_string(&post.tags)
            .map_err(|e| PostforgeError::Storage(format!("encode tags: {e}")))?;
        let now = ts(Utc::now());

        self.conn
            .execute(
                "INSERT INTO posts (id, source_id, slug, title, excerpt, content, tags_json, status,
                                    language, cover_image, seo_title, seo_description,
                                    scheduled_at, published_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO UPDATE SET
                   slug = excluded.slug,
                   title = excluded.title,
                   excerpt = excluded.excerpt,
                   content = excluded.content,
                   tags_json = excluded.tags_json,
                   status = excluded.status,
                   language = excluded.language,
                   cover_image = excluded.cover_image,
                   seo_title = excluded.seo_title,
                   seo_description = excluded.seo_description,
                   scheduled_at = excluded.scheduled_at,
                   published_at = excluded.published_at,
                   updated_at = excluded.updated_at",
                params![
                    post.id.to_string(),
                    post.source_id.as_deref(),
                    post.slug.as_str(),
                    post.title.as_str(),
                    post.excerpt.as_str(),
                    post.content.as_str(),
                    tags_json,
                    post.status.as_str(),
                    post.language.as_str(),
                    post.cover_image.as_deref(),
                    post.seo_title.as_str(),
                    post.seo_description.as_str(),
                    post.scheduled_at.map(ts),
                    post.published_at.map(ts),
                    ts(post.created_at),
                    now,
                ],
            )
            .await
            .map_err(|e| write_err(e, &post.slug))?;

        tracing::debug!(id = %post.id, slug = %post.slug, "post saved");
        Ok(())
    }

    /// The post generated from `source_id`, if any.
    pub async fn find_by_source_id(&self, source_id: &str) -> Result<Option<Post>> {
        self.query_one_post(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE source_id = ?1"),
            source_id,
        )
        .await
    }

    pub async fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        self.query_one_post(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = ?1"),
            slug,
        )
        .await
    }

    /// Whether any post already uses `slug`.
    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM posts WHERE slug = ?1 LIMIT 1", params![slug])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(row) => Ok(row.is_some()),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Drafts whose scheduled time is at or before `before`, oldest first.
    pub async fn due_scheduled(&self, before: DateTime<Utc>) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE status = 'draft' AND scheduled_at IS NOT NULL AND scheduled_at <= ?1
                 ORDER BY scheduled_at"
            ),
            params![ts(before)],
        )
        .await
    }

    /// Mark a post published at `at`.
    pub async fn publish_post(&self, id: &PostId, at: DateTime<Utc>) -> Result<()> {
        let at = ts(at);
        self.conn
            .execute(
                "UPDATE posts SET status = 'published', published_at = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![at, id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Published posts written in `language` that have no `locale` translation yet.
    pub async fn posts_missing_translation(
        &self,
        language: &str,
        locale: &str,
    ) -> Result<Vec<Post>> {
        self.query_posts(
            &format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.status = 'published' AND p.language = ?1
                   AND NOT EXISTS (
                     SELECT 1 FROM translations t WHERE t.post_id = p.id AND t.locale = ?2
                   )
                 ORDER BY p.created_at"
            ),
            params![language, locale],
        )
        .await
    }

    pub async fn get_post(&self, id: &PostId) -> Result<Option<Post>> {
        self.query_one_post(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
            &id.to_string(),
        )
        .await
    }

    /// Most recently created posts.
    pub async fn list_recent_posts(&self, limit: u32) -> Result<Vec<Post>> {
        self.query_posts(
            &format!("SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC LIMIT ?1"),
            params![i64::from(limit)],
        )
        .await
    }

    async fn query_one_post(&self, sql: &str, key: &str) -> Result<Option<Post>> {
        let mut rows = self
            .conn
            .query(sql, params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_post(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn query_posts(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Post>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_post(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Translations
    // -----------------------------------------------------------------------

    /// Store a translation, replacing any earlier one for the same locale.
    pub async fn upsert_translation(&self, translation: &Translation) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO translations (id, post_id, locale, title, excerpt, content,
                                           seo_title, seo_description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(post_id, locale) DO UPDATE SET
                   title = excluded.title,
                   excerpt = excluded.excerpt,
                   content = excluded.content,
                   seo_title = excluded.seo_title,
                   seo_description = excluded.seo_description,
                   created_at = excluded.created_at",
                params![
                    id,
                    translation.post_id.to_string(),
                    translation.locale.as_str(),
                    translation.title.as_str(),
                    translation.excerpt.as_str(),
                    translation.content.as_str(),
                    translation.seo_title.as_str(),
                    translation.seo_description.as_str(),
                    ts(translation.created_at),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_translation(&self, post_id: &PostId, locale: &str) -> Result<Option<Translation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT post_id, locale, title, excerpt, content, seo_title, seo_description, created_at
                 FROM translations WHERE post_id = ?1 AND locale = ?2",
                params![post_id.to_string(), locale],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Translation {
                post_id: parse_id(&get_string(&row, 0)?)?,
                locale: get_string(&row, 1)?,
                title: get_string(&row, 2)?,
                excerpt: get_string(&row, 3)?,
                content: get_string(&row, 4)?,
                seo_title: get_string(&row, 5)?,
                seo_description: get_string(&row, 6)?,
                created_at: parse_ts(&get_string(&row, 7)?)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Promotional catalog
    // -----------------------------------------------------------------------

    /// Replace the whole catalog, preserving the order of `items`.
    pub async fn replace_promo_catalog(&self, items: &[PromotionalItem]) -> Result<()> {
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute("DELETE FROM promo_items", params![])
            .await
            .map_err(storage_err)?;

        for (position, item) in items.iter().enumerate() {
            let keywords_json = serde_json::to_string(&item.keywords)
                .map_err(|e| PostforgeError::Storage(format!("encode keywords: {e}")))?;
            tx.execute(
                "INSERT INTO promo_items (id, position, name, target_url, category, keywords_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.id.as_str(),
                    position as i64,
                    item.name.as_str(),
                    item.target_url.as_str(),
                    item.category.as_str(),
                    keywords_json,
                ],
            )
            .await
            .map_err(|e| write_err(e, &item.id))?;
        }

        tx.commit().await.map_err(storage_err)?;
        tracing::info!(items = items.len(), "promotional catalog replaced");
        Ok(())
    }

    /// The full catalog in import order.
    pub async fn list_promo_items(&self) -> Result<Vec<PromotionalItem>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, target_url, category, keywords_json FROM promo_items
                 ORDER BY position",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let keywords_json = get_string(&row, 4)?;
            results.push(PromotionalItem {
                id: get_string(&row, 0)?,
                name: get_string(&row, 1)?,
                target_url: get_string(&row, 2)?,
                category: get_string(&row, 3)?,
                keywords: serde_json::from_str(&keywords_json)
                    .map_err(|e| PostforgeError::Storage(format!("decode keywords: {e}")))?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Convert a database row (selected with [`POST_COLUMNS`]) to a [`Post`].
fn row_to_post(row: &libsql::Row) -> Result<Post> {
    let tags_json = get_string(row, 6)?;
    Ok(Post {
        id: parse_id(&get_string(row, 0)?)?,
        source_id: row.get::<String>(1).ok(),
        slug: get_string(row, 2)?,
        title: get_string(row, 3)?,
        excerpt: get_string(row, 4)?,
        content: get_string(row, 5)?,
        tags: serde_json::from_str(&tags_json)
            .map_err(|e| PostforgeError::Storage(format!("decode tags: {e}")))?,
        status: get_string(row, 7)?.parse::<PostStatus>()?,
        language: get_string(row, 8)?,
        cover_image: row.get::<String>(9).ok(),
        seo_title: get_string(row, 10)?,
        seo_description: get_string(row, 11)?,
        scheduled_at: row.get::<String>(12).ok().map(|s| parse_ts(&s)).transpose()?,
        published_at: row.get::<String>(13).ok().map(|s| parse_ts(&s)).transpose()?,
        created_at: parse_ts(&get_string(row, 14)?)?,
    })
}

fn get_string(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

fn parse_id(s: &str) -> Result<PostId> {
    s.parse()
        .map_err(|e| PostforgeError::Storage(format!("invalid post id '{s}': {e}")))
}

/// Fixed-width UTC timestamps so that text comparison matches time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PostforgeError::Storage(format!("invalid date: {e}")))
}

fn storage_err(e: libsql::Error) -> PostforgeError {
    PostforgeError::Storage(e.to_string())
}

/// Unique constraint violations become conflicts; everything else is storage.
fn write_err(e: libsql::Error, key: &str) -> PostforgeError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        PostforgeError::Conflict(format!("{key}: {msg}"))
    } else {
        PostforgeError::Storage(msg)
    }
}
