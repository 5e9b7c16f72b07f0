//! `bahk cleanup`: find and remove bookmarks whose target entity is gone.

use std::time::Duration;

use tracing::info;

use crate::{
    application::{
        error::AppError,
        jobs::{TaskHandle, TaskStatus, TaskTracker, enqueue_reconcile_job},
        reconcile::{NoopObserver, ReconcileMode, ReconcileOptions, ReconcileReport},
    },
    config::CleanupArgs,
};

use super::{CommandContext, Confirm, rule};

const SOURCE: &str = "bahk::commands::cleanup";

/// Orphan count above which a synchronous deletion asks before proceeding.
pub const CONFIRM_THRESHOLD: u64 = 10;

#[derive(Debug)]
pub enum CleanupSummary {
    /// Counts only (`--stats`).
    Stats(ReconcileReport),
    /// Counts and samples, nothing deleted (`--dry-run`).
    Preview(ReconcileReport),
    /// The operator declined the deletion.
    Cancelled(ReconcileReport),
    Deleted(ReconcileReport),
    Queued(TaskHandle),
    Finished(TaskStatus),
}

pub async fn handle(
    ctx: &CommandContext,
    args: CleanupArgs,
    confirm: &dyn Confirm,
) -> Result<(), AppError> {
    let summary = run(ctx, &args, confirm).await?;
    print_summary(&summary);
    Ok(())
}

pub async fn run(
    ctx: &CommandContext,
    args: &CleanupArgs,
    confirm: &dyn Confirm,
) -> Result<CleanupSummary, AppError> {
    if args.batch_size == 0 {
        return Err(AppError::validation("--batch-size must be greater than zero"));
    }
    // Reject unknown names before touching the queue or the table.
    ctx.reconciler
        .resolve_filter(args.content_type.as_deref())?;

    let report_only = args.dry_run || args.stats;
    let options = ReconcileOptions {
        content_type: args.content_type.clone(),
        batch_size: args.batch_size,
        mode: if report_only {
            ReconcileMode::Report
        } else {
            ReconcileMode::Delete
        },
    };

    if args.run_async {
        return run_async(ctx, args, &options).await;
    }

    if report_only {
        let report = ctx.reconciler.run(&options, &NoopObserver).await?;
        return Ok(if args.stats {
            CleanupSummary::Stats(report)
        } else {
            CleanupSummary::Preview(report)
        });
    }

    if !args.yes {
        let mut preview = ctx
            .reconciler
            .run(
                &ReconcileOptions {
                    mode: ReconcileMode::Report,
                    ..options.clone()
                },
                &NoopObserver,
            )
            .await?;
        if preview.orphaned_found == 0 {
            preview.dry_run = false;
            return Ok(CleanupSummary::Deleted(preview));
        }
        if preview.orphaned_found > CONFIRM_THRESHOLD {
            print_report(&preview, true);
            let prompt = format!("About to delete {} orphaned bookmarks.", preview.orphaned_found);
            if !confirm.confirm(&prompt)? {
                info!(
                    target = SOURCE,
                    orphaned_found = preview.orphaned_found,
                    "Orphan cleanup cancelled by operator"
                );
                return Ok(CleanupSummary::Cancelled(preview));
            }
        }
    }

    let report = ctx.reconciler.run(&options, &NoopObserver).await?;
    Ok(CleanupSummary::Deleted(report))
}

async fn run_async(
    ctx: &CommandContext,
    args: &CleanupArgs,
    options: &ReconcileOptions,
) -> Result<CleanupSummary, AppError> {
    let handle = enqueue_reconcile_job(
        ctx.jobs.as_ref(),
        ctx.reports.as_ref(),
        options,
        ctx.reconcile_max_retries,
    )
    .await?;
    info!(
        target = SOURCE,
        job_id = %handle.job_id,
        run_id = %handle.run_id,
        "Queued orphan bookmark reconciliation"
    );

    if !args.wait {
        return Ok(CleanupSummary::Queued(handle));
    }

    let tracker = TaskTracker::new(ctx.jobs.clone(), ctx.reports.clone());
    let status = tracker
        .wait(&handle, Duration::from_secs(args.wait_timeout_seconds))
        .await?;
    Ok(CleanupSummary::Finished(status))
}

fn print_summary(summary: &CleanupSummary) {
    match summary {
        CleanupSummary::Stats(report) => {
            println!("Statistics mode: showing orphaned bookmark counts");
            print_report(report, false);
        }
        CleanupSummary::Preview(report) => {
            println!("Dry run: no bookmarks will be deleted");
            print_report(report, true);
            if report.orphaned_found > 0 {
                println!("Would delete {} orphaned bookmarks", report.orphaned_found);
            }
        }
        CleanupSummary::Cancelled(_) => println!("Operation cancelled"),
        CleanupSummary::Deleted(report) => {
            print_report(report, false);
            if report.deleted > 0 {
                println!(
                    "Deleted {} orphaned bookmarks in {:.2}s",
                    report.deleted, report.duration_seconds
                );
            }
        }
        CleanupSummary::Queued(handle) => {
            println!("Queued reconciliation job {}", handle.job_id);
            println!("Run id: {}", handle.run_id);
        }
        CleanupSummary::Finished(status) => {
            println!("Reconciliation job finished ({})", status.phase.as_str());
            println!("Attempts: {}", status.attempts);
            println!(
                "Processed: {}/{}",
                status.progress.current, status.progress.total
            );
            println!("Orphaned found: {}", status.progress.orphaned_found);
            println!("Deleted: {}", status.progress.deleted);
        }
    }
}

fn print_report(report: &ReconcileReport, with_samples: bool) {
    println!("Checked {} bookmarks", report.total_processed);
    if report.orphaned_found == 0 {
        println!("No orphaned bookmarks found");
        return;
    }

    println!("Orphaned bookmarks by content type:");
    println!("{}", rule(35));
    for (content_type, count) in &report.orphaned_by_type {
        println!("  {content_type}: {count}");
    }
    println!("Total orphaned bookmarks: {}", report.orphaned_found);

    if with_samples && !report.samples.is_empty() {
        println!("Sample orphaned bookmarks:");
        for (index, sample) in report.samples.iter().enumerate() {
            println!(
                "  {}. bookmark {} | user {} | {} {}",
                index + 1,
                sample.bookmark_id,
                sample.user_id,
                sample.content_type,
                sample.object_id
            );
        }
        let shown = report.samples.len() as u64;
        if report.orphaned_found > shown {
            println!("  ... and {} more", report.orphaned_found - shown);
        }
    }
}
