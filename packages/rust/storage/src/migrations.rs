//! SQL migration definitions for the postforge database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: posts, translations, promo_items",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Generated articles; at most one per source
CREATE TABLE IF NOT EXISTS posts (
    id              TEXT PRIMARY KEY,
    source_id       TEXT UNIQUE,
    slug            TEXT NOT NULL UNIQUE,
    title           TEXT NOT NULL,
    excerpt         TEXT NOT NULL,
    content         TEXT NOT NULL,
    tags_json       TEXT NOT NULL DEFAULT '[]',
    status          TEXT NOT NULL,
    language        TEXT NOT NULL,
    cover_image     TEXT,
    seo_title       TEXT NOT NULL,
    seo_description TEXT NOT NULL,
    scheduled_at    TEXT,
    published_at    TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_status_scheduled ON posts(status, scheduled_at);
CREATE INDEX IF NOT EXISTS idx_posts_language ON posts(language);

-- Per-locale renditions of a post
CREATE TABLE IF NOT EXISTS translations (
    id              TEXT PRIMARY KEY,
    post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    locale          TEXT NOT NULL,
    title           TEXT NOT NULL,
    excerpt         TEXT NOT NULL,
    content         TEXT NOT NULL,
    seo_title       TEXT NOT NULL,
    seo_description TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    UNIQUE(post_id, locale)
);

-- Promotional catalog, kept in import order
CREATE TABLE IF NOT EXISTS promo_items (
    id            TEXT PRIMARY KEY,
    position      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    target_url    TEXT NOT NULL,
    category      TEXT NOT NULL DEFAULT '',
    keywords_json TEXT NOT NULL DEFAULT '[]'
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
