use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, builder::BoolishValueParser};

pub(super) const DEFAULT_BATCH_SIZE: u32 = 1000;
pub(super) const DEFAULT_WARM_LIMIT: u32 = 100;

/// Command-line arguments for the bahk binary.
#[derive(Debug, Parser)]
#[command(
    name = "bahk",
    version,
    about = "Bookmark cache maintenance and orphan cleanup"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BAHK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSON logs instead of the compact format.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the background job workers until interrupted.
    Worker,
    /// Inspect and manage the bookmark cache.
    Cache(CacheArgs),
    /// Find and remove bookmarks whose content no longer exists.
    Cleanup(CleanupArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheAction {
    /// Print backend statistics.
    Stats,
    /// Remove every bookmark cache entry.
    Clear,
    /// Preload bookmark sets for recently active users.
    Warm,
    /// Compare database and cache lookups for one user.
    Test,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[arg(value_enum)]
    pub action: CacheAction,

    /// User to warm or test; defaults to recently active users.
    #[arg(long = "user-id", value_name = "ID")]
    pub user_id: Option<i64>,

    /// Maximum number of users to warm.
    #[arg(long, default_value_t = DEFAULT_WARM_LIMIT)]
    pub limit: u32,
}

#[derive(Debug, Args, Clone)]
pub struct CleanupArgs {
    /// Report orphaned bookmarks without deleting them.
    #[arg(long = "dry-run", action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Print bookmark counts per content type and exit.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub stats: bool,

    /// Restrict the sweep to a single content type.
    #[arg(long = "content-type", value_name = "NAME")]
    pub content_type: Option<String>,

    /// Enqueue the sweep as a background job.
    #[arg(long = "async", action = clap::ArgAction::SetTrue)]
    pub run_async: bool,

    /// Bookmarks examined per batch.
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u32,

    /// Block until the background job finishes (requires --async).
    #[arg(long, action = clap::ArgAction::SetTrue, requires = "run_async")]
    pub wait: bool,

    /// Give up waiting after this many seconds.
    #[arg(long = "wait-timeout-seconds", value_name = "SECONDS", default_value_t = 300)]
    pub wait_timeout_seconds: u64,

    /// Skip the confirmation prompt before deleting.
    #[arg(long, short = 'y', action = clap::ArgAction::SetTrue)]
    pub yes: bool,
}
