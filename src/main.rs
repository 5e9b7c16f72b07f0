use std::{process, sync::Arc, time::Duration};

use apalis::{
    layers::{WorkerBuilderExt, retry::RetryPolicy},
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use bahk::{
    application::{
        error::AppError,
        jobs::{
            JobWorkerContext, MaintenanceContext, RetrySettings, cache_maintenance_schedule,
            process_cache_maintenance_job, process_entity_cleanup_job, process_reconcile_job,
        },
        reconcile::OrphanReconciler,
        repos::{
            BookmarksRepo, ContentRepo, ContentTypesRepo, JobReportsRepo, JobsRepo, UsersRepo,
        },
    },
    cache::{BookmarkCacheManager, BookmarkCacheService, CacheConfig, build_store},
    commands::{self, CommandContext, StdinConfirm},
    config,
    domain::{content::ContentTypeRegistry, types::JobType},
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.messages().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = init_repositories(&settings).await?;
    let context = build_command_context(repositories.clone(), &settings).await?;

    match cli_args.command {
        config::Command::Worker => run_worker(repositories, context, &settings).await,
        config::Command::Cache(args) => commands::cache::handle(&context, args).await,
        config::Command::Cleanup(args) => {
            commands::cleanup::handle(&context, args, &StdinConfirm).await
        }
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn build_command_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<CommandContext, AppError> {
    let bookmarks_repo: Arc<dyn BookmarksRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let content_repo: Arc<dyn ContentRepo> = repositories.clone();
    let content_types_repo: Arc<dyn ContentTypesRepo> = repositories.clone();
    let jobs_repo: Arc<dyn JobsRepo> = repositories.clone();
    let reports_repo: Arc<dyn JobReportsRepo> = repositories.clone();

    let records = content_types_repo.list_content_types().await?;
    let registry = Arc::new(ContentTypeRegistry::from_records(&records)?);

    let cache_config = CacheConfig::from(&settings.cache);
    let store = build_store(&cache_config)
        .map_err(|err| AppError::from(InfraError::cache(err.to_string())))?;
    info!(
        backend = store.name(),
        enabled = cache_config.is_enabled(),
        ttl_secs = cache_config.ttl().as_secs(),
        "Bookmark cache configured"
    );

    let cache = Arc::new(BookmarkCacheService::new(
        cache_config,
        store,
        bookmarks_repo.clone(),
        registry.clone(),
    ));
    let manager = Arc::new(BookmarkCacheManager::new(cache.clone(), users_repo.clone()));
    let reconciler = Arc::new(OrphanReconciler::new(
        bookmarks_repo.clone(),
        content_repo.clone(),
        manager.clone(),
        registry.clone(),
    ));

    Ok(CommandContext {
        bookmarks: bookmarks_repo,
        users: users_repo,
        content: content_repo,
        jobs: jobs_repo,
        reports: reports_repo,
        registry,
        cache,
        manager,
        reconciler,
        reconcile_max_retries: settings.jobs.reconcile_max_retries,
    })
}

async fn run_worker(
    repositories: Arc<PostgresRepositories>,
    context: CommandContext,
    settings: &config::Settings,
) -> Result<(), AppError> {
    if let Err(err) = repositories.health_check().await {
        warn!(error = %err, "database health check failed before starting workers");
    }

    let job_context = JobWorkerContext {
        bookmarks: context.bookmarks.clone(),
        reports: context.reports.clone(),
        manager: context.manager.clone(),
        reconciler: context.reconciler.clone(),
        retry: RetrySettings {
            max_retries: settings.jobs.reconcile_max_retries,
            backoff_base: Duration::from_secs(settings.jobs.retry_backoff_seconds.get()),
        },
    };
    let maintenance = MaintenanceContext {
        cache: context.cache.clone(),
    };

    let grace = Duration::from_secs(settings.jobs.shutdown_grace_seconds.get());
    let monitor = build_job_monitor(repositories, job_context, maintenance, &settings.jobs)?;
    info!("bahk worker started; press Ctrl-C to stop");

    monitor
        .shutdown_timeout(grace)
        .run_with_signal(async move {
            tokio::signal::ctrl_c().await?;
            info!(
                grace_secs = grace.as_secs(),
                "shutdown signal received, draining in-flight jobs"
            );
            Ok(())
        })
        .await
        .map_err(|err| AppError::unexpected(format!("job monitor stopped: {err}")))?;

    info!("workers stopped");
    Ok(())
}

fn build_job_monitor(
    repositories: Arc<PostgresRepositories>,
    context: JobWorkerContext,
    maintenance: MaintenanceContext,
    jobs: &config::JobsSettings,
) -> Result<Monitor, AppError> {
    let cleanup_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::CleanupEntityBookmarks.as_str()),
    );
    let reconcile_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(JobType::ReconcileOrphanBookmarks.as_str()),
    );

    let cleanup_concurrency = jobs.cleanup_concurrency.get() as usize;
    let reconcile_concurrency = jobs.reconcile_concurrency.get() as usize;
    let reconcile_retries = jobs.reconcile_max_retries as usize;

    let cleanup_worker = WorkerBuilder::new("entity-cleanup-worker")
        .concurrency(cleanup_concurrency)
        .data(context.clone())
        .backend(cleanup_storage)
        .build_fn(process_entity_cleanup_job);
    let reconcile_worker = WorkerBuilder::new("orphan-reconcile-worker")
        .concurrency(reconcile_concurrency)
        .retry(RetryPolicy::retries(reconcile_retries))
        .data(context)
        .backend(reconcile_storage)
        .build_fn(process_reconcile_job);

    let schedule = cache_maintenance_schedule()
        .map_err(|err| AppError::unexpected(format!("invalid maintenance schedule: {err}")))?;
    let maintenance_worker = WorkerBuilder::new("bookmark-cache-maintenance-worker")
        .data(maintenance)
        .backend(CronStream::new(schedule))
        .build_fn(process_cache_maintenance_job);

    Ok(Monitor::new()
        .register(cleanup_worker)
        .register(reconcile_worker)
        .register(maintenance_worker))
}
