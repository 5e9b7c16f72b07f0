//! `bahk cache`: inspect, clear, warm and benchmark the bookmark cache.

use std::time::{Duration, Instant};

use tracing::info;

use crate::{
    application::{error::AppError, repos::BookmarkFilter},
    cache::CacheStats,
    config::{CacheAction, CacheArgs},
    domain::{
        content::{ContentKind, ContentRef},
        error::DomainError,
        types::{ObjectId, UserId},
    },
};

use super::{CommandContext, rule};

const SOURCE: &str = "bahk::commands::cache";
const BENCHMARK_SAMPLE: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseStats {
    pub total_bookmarks: u64,
    pub users_with_bookmarks: u64,
    /// `(content type name, count)`, largest first.
    pub by_content_type: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarmSummary {
    pub users: usize,
    pub content_types: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupTimings {
    pub user_id: UserId,
    pub items: usize,
    pub database: Duration,
    pub cache: Duration,
    pub batch_cache: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheSummary {
    Stats {
        cache: CacheStats,
        database: DatabaseStats,
    },
    ClearedUser(UserId),
    ClearedAll(u64),
    Warmed(WarmSummary),
    Timings(LookupTimings),
    /// Nothing to benchmark; carries the reason.
    Skipped(&'static str),
}

pub async fn handle(ctx: &CommandContext, args: CacheArgs) -> Result<(), AppError> {
    let summary = run(ctx, &args).await?;
    print_summary(&summary);
    Ok(())
}

pub async fn run(ctx: &CommandContext, args: &CacheArgs) -> Result<CacheSummary, AppError> {
    match args.action {
        CacheAction::Stats => stats(ctx).await,
        CacheAction::Clear => clear(ctx, args.user_id).await,
        CacheAction::Warm => warm(ctx, args.user_id, args.limit).await,
        CacheAction::Test => benchmark(ctx, args.user_id).await,
    }
}

async fn stats(ctx: &CommandContext) -> Result<CacheSummary, AppError> {
    let cache = ctx.cache.cache_stats().await;

    let total_bookmarks = ctx.bookmarks.count_bookmarks(BookmarkFilter::default()).await?;
    let users_with_bookmarks = ctx.bookmarks.count_users_with_bookmarks().await?;
    let mut by_content_type: Vec<(String, u64)> = ctx
        .bookmarks
        .count_by_content_type()
        .await?
        .into_iter()
        .map(|(id, count)| (ctx.content_type_label(id), count))
        .collect();
    by_content_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    Ok(CacheSummary::Stats {
        cache,
        database: DatabaseStats {
            total_bookmarks,
            users_with_bookmarks,
            by_content_type,
        },
    })
}

async fn clear(ctx: &CommandContext, user_id: Option<UserId>) -> Result<CacheSummary, AppError> {
    match user_id {
        Some(user_id) => {
            ensure_user(ctx, user_id).await?;
            ctx.manager.user_cache_invalidated(user_id).await;
            Ok(CacheSummary::ClearedUser(user_id))
        }
        None => {
            let removed = ctx.cache.clear_all().await?;
            info!(target = SOURCE, removed, "Cleared bookmark cache");
            Ok(CacheSummary::ClearedAll(removed))
        }
    }
}

async fn warm(
    ctx: &CommandContext,
    user_id: Option<UserId>,
    limit: u32,
) -> Result<CacheSummary, AppError> {
    let users = match user_id {
        Some(user_id) => {
            ensure_user(ctx, user_id).await?;
            vec![user_id]
        }
        None => ctx.users.list_users_with_bookmarks(limit).await?,
    };

    let content_types = ctx.registry.all_ids();
    let mut entries = 0;
    for &user in &users {
        for &content_type in &content_types {
            ctx.cache.preload_user_bookmarks(user, content_type).await;
            entries += 1;
        }
    }

    info!(
        target = SOURCE,
        users = users.len(),
        entries,
        "Warmed bookmark cache"
    );
    Ok(CacheSummary::Warmed(WarmSummary {
        users: users.len(),
        content_types: content_types.len(),
        entries,
    }))
}

/// Times per-item database lookups against cached and batched lookups for
/// a sample of videos.
async fn benchmark(ctx: &CommandContext, user_id: Option<UserId>) -> Result<CacheSummary, AppError> {
    let user_id = match user_id {
        Some(user_id) => {
            ensure_user(ctx, user_id).await?;
            user_id
        }
        None => match ctx.users.list_users_with_bookmarks(1).await?.first() {
            Some(&user_id) => user_id,
            None => return Ok(CacheSummary::Skipped("no users with bookmarks found")),
        },
    };

    let ids: Vec<ObjectId> = ctx
        .content
        .sample_object_ids(ContentKind::Video, BENCHMARK_SAMPLE)
        .await?;
    if ids.is_empty() {
        return Ok(CacheSummary::Skipped("no videos found"));
    }
    let objects: Vec<ContentRef> = ids
        .iter()
        .map(|&id| ContentRef::new(ContentKind::Video, id))
        .collect();
    let content_type = ctx.registry.resolve(ContentKind::Video);

    let started = Instant::now();
    for &id in &ids {
        ctx.bookmarks.find_bookmark(user_id, content_type, id).await?;
    }
    let database = started.elapsed();

    let started = Instant::now();
    for object in &objects {
        ctx.manager.is_bookmarked(user_id, object).await;
    }
    let cache = started.elapsed();

    let started = Instant::now();
    ctx.manager.bookmarks_for_objects(user_id, &objects).await;
    let batch_cache = started.elapsed();

    Ok(CacheSummary::Timings(LookupTimings {
        user_id,
        items: ids.len(),
        database,
        cache,
        batch_cache,
    }))
}

async fn ensure_user(ctx: &CommandContext, user_id: UserId) -> Result<(), AppError> {
    match ctx.users.find_user(user_id).await? {
        Some(_) => Ok(()),
        None => Err(DomainError::not_found("user").into()),
    }
}

fn print_summary(summary: &CacheSummary) {
    match summary {
        CacheSummary::Stats { cache, database } => {
            println!("Bookmark cache statistics");
            println!("{}", rule(50));
            match &cache.error {
                Some(error) => println!("Cache unavailable: {error}"),
                None => {
                    println!("Backend: {}", cache.backend);
                    println!("Total bookmark keys: {}", cache.total_keys);
                    println!(
                        "Memory used: {}",
                        cache.memory_used.as_deref().unwrap_or("unknown")
                    );
                    match cache.hit_ratio {
                        Some(ratio) => println!("Hit ratio: {:.1}%", ratio * 100.0),
                        None => println!("Hit ratio: n/a"),
                    }
                    println!("Cache TTL: {} seconds", cache.cache_ttl_secs);
                    println!("Cache prefix: {}", cache.cache_prefix);
                }
            }

            println!();
            println!("Database statistics");
            println!("{}", rule(30));
            println!("Total bookmarks: {}", database.total_bookmarks);
            println!("Users with bookmarks: {}", database.users_with_bookmarks);
            println!();
            println!("Bookmarks by content type");
            println!("{}", rule(35));
            for (name, count) in &database.by_content_type {
                println!("  {name}: {count}");
            }
        }
        CacheSummary::ClearedUser(user_id) => println!("Cleared cache for user {user_id}"),
        CacheSummary::ClearedAll(removed) => {
            println!("Cleared {removed} bookmark cache entries")
        }
        CacheSummary::Warmed(warm) => println!(
            "Warmed cache for {} users across {} content types ({} cache entries)",
            warm.users, warm.content_types, warm.entries
        ),
        CacheSummary::Timings(timings) => print_timings(timings),
        CacheSummary::Skipped(reason) => println!("Skipped: {reason}"),
    }
}

fn print_timings(timings: &LookupTimings) {
    let per_item = |elapsed: Duration| elapsed.as_secs_f64() * 1000.0 / timings.items as f64;

    println!(
        "Lookup timings for user {} ({} videos)",
        timings.user_id, timings.items
    );
    println!("{}", rule(45));
    for (label, elapsed) in [
        ("Database lookup", timings.database),
        ("Cache lookup", timings.cache),
        ("Batch cache lookup", timings.batch_cache),
    ] {
        println!(
            "{label}: {:.4}s ({:.2}ms per item)",
            elapsed.as_secs_f64(),
            per_item(elapsed)
        );
    }

    let database = timings.database.as_secs_f64();
    if database > 0.0 {
        for (label, elapsed) in [
            ("Individual cache", timings.cache),
            ("Batch cache", timings.batch_cache),
        ] {
            let secs = elapsed.as_secs_f64();
            if secs > 0.0 {
                println!("{label}: {:.1}x faster", database / secs);
            }
        }
    }
}
