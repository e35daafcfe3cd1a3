//! Shared types, error model, and configuration for postforge.
//!
//! This crate is the foundation depended on by all other postforge crates.
//! It provides:
//! - [`PostforgeError`]: the unified error type
//! - Domain types ([`SourceItem`], [`Transcript`], [`ParsedContent`], [`Post`], [`PromotionalItem`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, GenerationConfig, PromoConfig, ServerConfig, SlugConfig,
    YoutubeConfig, config_dir, config_file_path, database_path, expand_home, init_config,
    load_config, load_config_from, resolve_secret, validate_api_key, validate_youtube_key,
};
pub use error::{PostforgeError, Result};
pub use types::{
    MatchScore, ParsedContent, Post, PostId, PostStatus, PromotionalItem, SourceItem, SourceKind,
    SourceMetadata, TopicSeed, Transcript, TranscriptChunk, TranscriptSegment, Translation,
};
