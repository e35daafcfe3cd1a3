//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::info;

use postforge_core::{Disposition, ItemOutcome, ProgressReporter, RunSummary};
use postforge_shared::{
    AppConfig, Post, PromotionalItem, TopicSeed, init_config, load_config, resolve_secret,
    validate_youtube_key,
};

use crate::context::{AppContext, open_storage, publish_scheduled};
use crate::server::{ServerState, serve};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// postforge: turn videos and topics into published posts.
#[derive(Parser)]
#[command(
    name = "postforge",
    version,
    about = "Generate blog posts from YouTube videos and topic prompts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate a single post.
    Generate {
        #[command(subcommand)]
        source: GenerateSource,
    },

    /// Run a checkpointed batch job.
    Batch {
        #[command(subcommand)]
        job: BatchJob,
    },

    /// Publish drafts whose scheduled time has passed.
    PublishDue,

    /// List the most recent posts.
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Promotional catalog management.
    Promo {
        #[command(subcommand)]
        action: PromoAction,
    },

    /// Start the scheduled-trigger HTTP server.
    Serve {
        /// Bind address (defaults to server.bind).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// What to generate a single post from.
#[derive(Subcommand)]
pub(crate) enum GenerateSource {
    /// A YouTube video by id.
    Video {
        id: String,

        /// Publish immediately instead of saving a draft.
        #[arg(long)]
        publish: bool,
    },
    /// A free-form topic prompt.
    Topic {
        prompt: String,

        /// Seed keywords (comma-separated).
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,

        #[arg(short, long, default_value = "")]
        category: String,

        /// Publish immediately instead of saving a draft.
        #[arg(long)]
        publish: bool,
    },
}

/// Batch jobs.
#[derive(Subcommand)]
pub(crate) enum BatchJob {
    /// Generate posts for the channel's recent uploads.
    Youtube {
        /// Items per run (defaults to batch.daily_quota).
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Generate today's scheduled topic posts.
    Topics {
        /// Posts per run (defaults to batch.posts_per_day).
        #[arg(long)]
        count: Option<usize>,
    },
    /// Translate published posts between Korean and English.
    Translate {
        /// Items per run (defaults to batch.daily_quota).
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Promotional catalog subcommands.
#[derive(Subcommand)]
pub(crate) enum PromoAction {
    /// Replace the catalog with the items in a TOML or JSON file.
    Import { file: PathBuf },
    /// Show the stored catalog.
    List,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "postforge=info",
        1 => "postforge=debug",
        _ => "postforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate { source } => match source {
            GenerateSource::Video { id, publish } => cmd_generate_video(&id, publish).await,
            GenerateSource::Topic {
                prompt,
                keywords,
                category,
                publish,
            } => {
                let seed = TopicSeed {
                    prompt,
                    keywords,
                    category,
                };
                cmd_generate_topic(&seed, publish).await
            }
        },
        Command::Batch { job } => cmd_batch(job).await,
        Command::PublishDue => cmd_publish_due().await,
        Command::List { limit } => cmd_list(limit).await,
        Command::Promo { action } => match action {
            PromoAction::Import { file } => cmd_promo_import(&file).await,
            PromoAction::List => cmd_promo_list().await,
        },
        Command::Serve { bind } => cmd_serve(bind).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn disposition(publish: bool) -> Disposition {
    if publish {
        Disposition::Publish
    } else {
        Disposition::Draft
    }
}

async fn cmd_generate_video(id: &str, publish: bool) -> Result<()> {
    let config = load_config()?;
    validate_youtube_key(&config)?;
    let ctx = AppContext::load(config).await?;

    info!(video_id = id, "generating post from video");
    let reporter = CliProgress::new();
    let outcome = ctx
        .pipeline()
        .process_video(id, disposition(publish), &reporter)
        .await;
    reporter.finish();

    print_outcome(&outcome?);
    Ok(())
}

async fn cmd_generate_topic(seed: &TopicSeed, publish: bool) -> Result<()> {
    let config = load_config()?;
    let ctx = AppContext::load(config).await?;

    info!(prompt = %seed.prompt, "generating post from topic");
    let reporter = CliProgress::new();
    let outcome = ctx
        .pipeline()
        .process_topic(seed, disposition(publish), &reporter)
        .await;
    reporter.finish();

    print_outcome(&outcome?);
    Ok(())
}

fn print_outcome(outcome: &ItemOutcome) {
    let post = outcome.post();
    println!();
    match outcome {
        ItemOutcome::Created(_) => println!("  Post created!"),
        ItemOutcome::Duplicate(_) => println!("  Source already has a post; nothing generated."),
    }
    println!("  Title:    {}", post.title);
    println!("  Slug:     {}", post.slug);
    println!("  Status:   {}", post.status.as_str());
    println!("  Language: {}", post.language);
    println!("  Tags:     {}", post.tags.join(", "));
    println!();
}

async fn cmd_batch(job: BatchJob) -> Result<()> {
    let config = load_config()?;
    let mut ctx = AppContext::load(config).await?;

    let summary = match job {
        BatchJob::Youtube { limit } => {
            if let Some(limit) = limit {
                ctx.batch.limit = limit;
            }
            ctx.run_youtube_sync().await?
        }
        BatchJob::Topics { count } => {
            if let Some(count) = count {
                ctx.batch.posts_per_day = count;
            }
            ctx.run_daily_posts(Utc::now()).await?
        }
        BatchJob::Translate { limit } => {
            if let Some(limit) = limit {
                ctx.batch.limit = limit;
            }
            ctx.run_translations().await?
        }
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  State:     {:?}", summary.state);
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed.len());
    for failed in &summary.failed {
        println!("    {}: {}", failed.key, failed.error);
    }
    println!("  Remaining: {}", summary.remaining);
    if let Some(key) = &summary.stopped_at {
        println!("  Stopped:   {key}");
    }
    println!();
}

async fn cmd_publish_due() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let summary = publish_scheduled(&storage, Utc::now()).await?;
    println!("Published {} scheduled post(s).", summary.succeeded);
    Ok(())
}

async fn cmd_list(limit: u32) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let posts = storage.list_recent_posts(limit).await?;
    if posts.is_empty() {
        println!("No posts yet.");
        return Ok(());
    }
    for post in &posts {
        println!("{}", post_line(post));
    }
    Ok(())
}

fn post_line(post: &Post) -> String {
    let when = match (post.published_at, post.scheduled_at) {
        (Some(at), _) => format!("published {}", at.format("%Y-%m-%d %H:%M")),
        (None, Some(at)) => format!("scheduled {}", at.format("%Y-%m-%d %H:%M")),
        (None, None) => post.status.as_str().to_string(),
    };
    format!("{:<48} [{}] {} ({when})", post.slug, post.language, post.title)
}

#[derive(Deserialize)]
struct PromoFile {
    #[serde(default)]
    items: Vec<PromotionalItem>,
}

/// Parse a catalog file: a TOML `[[items]]` table, or a JSON array / `{"items": [...]}`.
fn parse_promo_file(path: &Path, content: &str) -> Result<Vec<PromotionalItem>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let items = if is_json {
        match serde_json::from_str::<Vec<PromotionalItem>>(content) {
            Ok(items) => items,
            Err(_) => serde_json::from_str::<PromoFile>(content)?.items,
        }
    } else {
        toml::from_str::<PromoFile>(content)?.items
    };

    if let Some(item) = items
        .iter()
        .find(|i| i.id.trim().is_empty() || i.name.trim().is_empty() || i.target_url.trim().is_empty())
    {
        return Err(eyre!("catalog item '{}' needs an id, a name and a target_url", item.id));
    }
    Ok(items)
}

async fn cmd_promo_import(file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let items = parse_promo_file(file, &content)?;

    let config = load_config()?;
    let storage = open_storage(&config).await?;
    storage.replace_promo_catalog(&items).await?;
    println!("Imported {} promotional item(s).", items.len());
    Ok(())
}

async fn cmd_promo_list() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    for item in storage.list_promo_items().await? {
        println!("{:<20} {:<32} {}", item.id, item.name, item.keywords.join(", "));
    }
    Ok(())
}

async fn cmd_serve(bind: Option<String>) -> Result<()> {
    let config = load_config()?;
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let secret = resolve_secret(&config.server.cron_secret_env, "Cron secret").ok();
    let ctx = AppContext::load(config).await?;
    serve(ServerState::new(ctx, secret), &bind).await
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, post: &Post) {
        self.spinner.set_message(format!("Stored {}", post.slug));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_catalog() {
        let content = r#"
[[items]]
id = "kbd-1"
name = "Mechanical keyboard"
target_url = "https://example.com/kbd"
category = "gear"
keywords = ["keyboard", "typing"]
"#;
        let items = parse_promo_file(Path::new("catalog.toml"), content).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].keywords, vec!["keyboard", "typing"]);
    }

    #[test]
    fn parses_json_catalog_in_either_shape() {
        let array = r#"[{"id": "a", "name": "A", "target_url": "https://a.example"}]"#;
        let wrapped = r#"{"items": [{"id": "a", "name": "A", "target_url": "https://a.example"}]}"#;
        for content in [array, wrapped] {
            let items = parse_promo_file(Path::new("catalog.JSON"), content).unwrap();
            assert_eq!(items[0].id, "a");
        }
    }

    #[test]
    fn rejects_items_without_url() {
        let content = r#"[{"id": "a", "name": "A", "target_url": ""}]"#;
        assert!(parse_promo_file(Path::new("c.json"), content).is_err());
    }

    #[test]
    fn cli_parses_batch_flags() {
        let cli = Cli::try_parse_from(["postforge", "-v", "batch", "topics", "--count", "3"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(
            cli.command,
            Command::Batch {
                job: BatchJob::Topics { count: Some(3) }
            }
        ));
    }
}
