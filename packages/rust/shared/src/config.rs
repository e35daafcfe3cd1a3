//! Application configuration for postforge.
//!
//! User config lives at `~/.postforge/postforge.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file; it only names the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PostforgeError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "postforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".postforge";

// ---------------------------------------------------------------------------
// Config structs (matching postforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// OpenRouter connection settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Generation tuning.
    #[serde(default)]
    pub generation: GenerationSection,

    /// YouTube Data API and caption settings.
    #[serde(default)]
    pub youtube: YoutubeConfig,

    /// Batch scheduler settings.
    #[serde(default)]
    pub batch: BatchSection,

    /// Promotional link matching.
    #[serde(default)]
    pub promo: PromoSection,

    /// Scheduled-trigger HTTP server.
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub slug: SlugConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.postforge/postforge.db".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for every generation call.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Base URL of the chat completions API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            api_base: default_api_base(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Minimum spacing between consecutive generation calls.
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,

    /// Token bucket refill rate shared by all generation call sites.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Upper bound on transcript characters per chunk.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Videos shorter than this many seconds are treated as short-form.
    #[serde(default = "default_short_form_seconds")]
    pub short_form_seconds: u64,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            chunk_delay_ms: default_chunk_delay(),
            requests_per_minute: default_requests_per_minute(),
            max_chunk_chars: default_max_chunk_chars(),
            short_form_seconds: default_short_form_seconds(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    8192
}
fn default_chunk_delay() -> u64 {
    1000
}
fn default_requests_per_minute() -> u32 {
    15
}
fn default_max_chunk_chars() -> usize {
    4000
}
fn default_short_form_seconds() -> u64 {
    120
}
fn default_generation_timeout() -> u64 {
    120
}

/// `[youtube]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// Name of the env var holding the Data API key.
    #[serde(default = "default_youtube_key_env")]
    pub api_key_env: String,

    /// Channel whose uploads feed the video batch.
    #[serde(default)]
    pub channel_id: String,

    #[serde(default = "default_youtube_api_base")]
    pub api_base: String,

    #[serde(default = "default_caption_base")]
    pub caption_base: String,

    /// Caption languages tried in order before falling back to any track.
    #[serde(default = "default_caption_languages")]
    pub caption_languages: Vec<String>,

    /// How many recent uploads to consider per sync.
    #[serde(default = "default_max_uploads")]
    pub max_uploads: u32,

    #[serde(default = "default_youtube_timeout")]
    pub timeout_secs: u64,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_youtube_key_env(),
            channel_id: String::new(),
            api_base: default_youtube_api_base(),
            caption_base: default_caption_base(),
            caption_languages: default_caption_languages(),
            max_uploads: default_max_uploads(),
            timeout_secs: default_youtube_timeout(),
        }
    }
}

fn default_youtube_key_env() -> String {
    "YOUTUBE_API_KEY".into()
}
fn default_youtube_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}
fn default_caption_base() -> String {
    "https://www.youtube.com/api/timedtext".into()
}
fn default_caption_languages() -> Vec<String> {
    vec!["ko".into(), "en".into()]
}
fn default_max_uploads() -> u32 {
    10
}
fn default_youtube_timeout() -> u64 {
    30
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Items attempted per invocation.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: usize,

    /// Fixed pause between items.
    #[serde(default = "default_item_delay")]
    pub delay_ms: u64,

    /// Directory holding one checkpoint file per job.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,

    /// Topic posts generated per daily run.
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: usize,

    /// Spacing between scheduled topic posts.
    #[serde(default = "default_hours_between_posts")]
    pub hours_between_posts: i64,

    /// TOML file with `[[topics]]` entries for the topic batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_pool: Option<String>,

    /// Publish video posts immediately instead of leaving drafts.
    #[serde(default)]
    pub auto_publish: bool,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            daily_quota: default_daily_quota(),
            delay_ms: default_item_delay(),
            checkpoint_dir: default_checkpoint_dir(),
            posts_per_day: default_posts_per_day(),
            hours_between_posts: default_hours_between_posts(),
            topic_pool: None,
            auto_publish: false,
        }
    }
}

fn default_daily_quota() -> usize {
    45
}
fn default_item_delay() -> u64 {
    3000
}
fn default_checkpoint_dir() -> String {
    "~/.postforge/checkpoints".into()
}
fn default_posts_per_day() -> usize {
    5
}
fn default_hours_between_posts() -> i64 {
    2
}

/// `[promo]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoSection {
    #[serde(default = "default_min_score")]
    pub min_score: u32,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Notice appended once to any content that received links.
    #[serde(default = "default_disclosure")]
    pub disclosure: String,
}

impl Default for PromoSection {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_results: default_max_results(),
            disclosure: default_disclosure(),
        }
    }
}

fn default_min_score() -> u32 {
    20
}
fn default_max_results() -> usize {
    2
}
fn default_disclosure() -> String {
    "This post contains affiliate links. We may earn a commission from qualifying purchases at no extra cost to you.".into()
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Name of the env var holding the shared trigger secret.
    #[serde(default = "default_cron_secret_env")]
    pub cron_secret_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cron_secret_env: default_cron_secret_env(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".into()
}
fn default_cron_secret_env() -> String {
    "CRON_SECRET".into()
}

/// `[slug]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlugConfig {
    #[serde(default = "default_slug_max_len")]
    pub max_len: usize,

    /// Candidates probed before allocation fails.
    #[serde(default = "default_slug_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SlugConfig {
    fn default() -> Self {
        Self {
            max_len: default_slug_max_len(),
            max_attempts: default_slug_max_attempts(),
        }
    }
}

fn default_slug_max_len() -> usize {
    60
}
fn default_slug_max_attempts() -> u32 {
    1000
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime generation settings for the orchestrator and parser.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub chunk_delay_ms: u64,
    pub requests_per_minute: u32,
    pub max_chunk_chars: usize,
    pub short_form_seconds: u64,
    pub slug_max_len: usize,
    pub slug_max_attempts: u32,
}

impl From<&AppConfig> for GenerationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.openrouter.default_model.clone(),
            temperature: config.generation.temperature,
            max_output_tokens: config.generation.max_output_tokens,
            chunk_delay_ms: config.generation.chunk_delay_ms,
            requests_per_minute: config.generation.requests_per_minute,
            max_chunk_chars: config.generation.max_chunk_chars,
            short_form_seconds: config.generation.short_form_seconds,
            slug_max_len: config.slug.max_len,
            slug_max_attempts: config.slug.max_attempts,
        }
    }
}

/// Runtime batch settings for one scheduler invocation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Quota window limit for this invocation.
    pub limit: usize,
    pub delay_ms: u64,
    pub checkpoint_dir: PathBuf,
    pub posts_per_day: usize,
    pub hours_between_posts: i64,
    pub auto_publish: bool,
}

impl BatchConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            limit: config.batch.daily_quota,
            delay_ms: config.batch.delay_ms,
            checkpoint_dir: expand_home(&config.batch.checkpoint_dir)?,
            posts_per_day: config.batch.posts_per_day,
            hours_between_posts: config.batch.hours_between_posts,
            auto_publish: config.batch.auto_publish,
        })
    }
}

/// Runtime promotional matching settings.
#[derive(Debug, Clone)]
pub struct PromoConfig {
    pub min_score: u32,
    pub max_results: usize,
    pub disclosure: String,
}

impl From<&AppConfig> for PromoConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_score: config.promo.min_score,
            max_results: config.promo.max_results,
            disclosure: config.promo.disclosure.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.postforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PostforgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.postforge/postforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PostforgeError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Resolved database file path.
pub fn database_path(config: &AppConfig) -> Result<PathBuf> {
    expand_home(&config.database.path)
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PostforgeError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PostforgeError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PostforgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PostforgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PostforgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named env var, failing with a hint when it is unset.
pub fn resolve_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PostforgeError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// The OpenRouter API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    resolve_secret(&config.openrouter.api_key_env, "OpenRouter API key")
}

/// The YouTube Data API key from the configured env var.
pub fn validate_youtube_key(config: &AppConfig) -> Result<String> {
    resolve_secret(&config.youtube.api_key_env, "YouTube API key")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("daily_quota"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("CRON_SECRET"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[batch]
daily_quota = 10

[youtube]
channel_id = "UC123"
caption_languages = ["en"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.batch.daily_quota, 10);
        assert_eq!(config.batch.delay_ms, 3000);
        assert_eq!(config.youtube.channel_id, "UC123");
        assert_eq!(config.youtube.caption_languages, vec!["en".to_string()]);
        assert_eq!(config.promo.min_score, 20);
        assert_eq!(config.slug.max_len, 60);
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();

        let generation = GenerationConfig::from(&app);
        assert_eq!(generation.max_chunk_chars, 4000);
        assert_eq!(generation.short_form_seconds, 120);
        assert_eq!(generation.chunk_delay_ms, 1000);

        let promo = PromoConfig::from(&app);
        assert_eq!(promo.max_results, 2);

        let batch = BatchConfig::from_app(&app).expect("batch config");
        assert_eq!(batch.limit, 45);
        assert!(batch.checkpoint_dir.ends_with(".postforge/checkpoints"));
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home("/tmp/pf.db").unwrap(),
            PathBuf::from("/tmp/pf.db")
        );
        assert!(!expand_home("~/x.db").unwrap().starts_with("~"));
    }

    #[test]
    fn secret_validation() {
        let mut config = AppConfig::default();
        // Unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "PF_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
