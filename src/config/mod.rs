//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheBackend;

mod cli;

pub use cli::{CacheAction, CacheArgs, CleanupArgs, CliArgs, Command, GlobalOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "bahk";
const ENV_PREFIX: &str = "BAHK";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_CACHE_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_BULK_CLEANUP_THRESHOLD: u64 = 10;
const DEFAULT_ASYNC_CLEANUP_THRESHOLD: u64 = 50;
const DEFAULT_JOB_CLEANUP_CONCURRENCY: u32 = 2;
const DEFAULT_JOB_RECONCILE_CONCURRENCY: u32 = 1;
const DEFAULT_JOB_RECONCILE_MAX_RETRIES: u32 = 2;
const DEFAULT_JOB_RETRY_BACKOFF_SECS: u64 = 60;
const DEFAULT_JOB_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub redis_url: String,
    pub ttl_secs: NonZeroU64,
    pub operation_timeout_ms: NonZeroU64,
    pub bulk_cleanup_threshold: NonZeroU64,
    pub async_cleanup_threshold: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub cleanup_concurrency: NonZeroU32,
    pub reconcile_concurrency: NonZeroU32,
    pub reconcile_max_retries: u32,
    pub retry_backoff_seconds: NonZeroU64,
    /// How long in-flight jobs may run after a shutdown signal.
    pub shutdown_grace_seconds: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_global_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    jobs: RawJobsSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            jobs,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            jobs: build_jobs_settings(jobs)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("redis") => CacheBackend::Redis,
        Some("memory") => CacheBackend::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}`, expected `redis` or `memory`"),
            ));
        }
    };

    let redis_url = cache
        .redis_url
        .map(|url| url.trim().to_string())
        .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    if backend == CacheBackend::Redis && redis_url.is_empty() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "must not be empty when the redis backend is selected",
        ));
    }

    let ttl_secs = non_zero_u64(
        cache.ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.ttl_secs",
    )?;
    let operation_timeout_ms = non_zero_u64(
        cache
            .operation_timeout_ms
            .unwrap_or(DEFAULT_CACHE_OPERATION_TIMEOUT_MS),
        "cache.operation_timeout_ms",
    )?;
    let bulk_cleanup_threshold = non_zero_u64(
        cache
            .bulk_cleanup_threshold
            .unwrap_or(DEFAULT_BULK_CLEANUP_THRESHOLD),
        "cache.bulk_cleanup_threshold",
    )?;
    let async_cleanup_threshold = non_zero_u64(
        cache
            .async_cleanup_threshold
            .unwrap_or(DEFAULT_ASYNC_CLEANUP_THRESHOLD),
        "cache.async_cleanup_threshold",
    )?;
    if async_cleanup_threshold < bulk_cleanup_threshold {
        return Err(LoadError::invalid(
            "cache.async_cleanup_threshold",
            "must not be lower than cache.bulk_cleanup_threshold",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        redis_url,
        ttl_secs,
        operation_timeout_ms,
        bulk_cleanup_threshold,
        async_cleanup_threshold,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let cleanup = jobs
        .cleanup_concurrency
        .unwrap_or(DEFAULT_JOB_CLEANUP_CONCURRENCY);
    let reconcile = jobs
        .reconcile_concurrency
        .unwrap_or(DEFAULT_JOB_RECONCILE_CONCURRENCY);

    Ok(JobsSettings {
        cleanup_concurrency: non_zero_u32(cleanup.into(), "jobs.cleanup_concurrency")?,
        reconcile_concurrency: non_zero_u32(reconcile.into(), "jobs.reconcile_concurrency")?,
        reconcile_max_retries: jobs
            .reconcile_max_retries
            .unwrap_or(DEFAULT_JOB_RECONCILE_MAX_RETRIES),
        retry_backoff_seconds: non_zero_u64(
            jobs.retry_backoff_seconds
                .unwrap_or(DEFAULT_JOB_RETRY_BACKOFF_SECS),
            "jobs.retry_backoff_seconds",
        )?,
        shutdown_grace_seconds: non_zero_u64(
            jobs.shutdown_grace_seconds
                .unwrap_or(DEFAULT_JOB_SHUTDOWN_GRACE_SECS),
            "jobs.shutdown_grace_seconds",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    ttl_secs: Option<u64>,
    operation_timeout_ms: Option<u64>,
    bulk_cleanup_threshold: Option<u64>,
    async_cleanup_threshold: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    cleanup_concurrency: Option<u32>,
    reconcile_concurrency: Option<u32>,
    reconcile_max_retries: Option<u32>,
    retry_backoff_seconds: Option<u64>,
    shutdown_grace_seconds: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
