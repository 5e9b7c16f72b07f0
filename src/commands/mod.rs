//! Handlers for the `cache` and `cleanup` subcommands.
//!
//! Each handler prints a human-readable summary on stdout; logs stay on stderr.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::{
    application::{
        error::AppError,
        reconcile::OrphanReconciler,
        repos::{BookmarksRepo, ContentRepo, JobReportsRepo, JobsRepo, UsersRepo},
    },
    cache::{BookmarkCacheManager, BookmarkCacheService},
    domain::{content::ContentTypeRegistry, types::ContentTypeId},
};

pub mod cache;
pub mod cleanup;

/// Everything a one-shot command needs, wired once in `main`.
#[derive(Clone)]
pub struct CommandContext {
    pub bookmarks: Arc<dyn BookmarksRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub content: Arc<dyn ContentRepo>,
    pub jobs: Arc<dyn JobsRepo>,
    pub reports: Arc<dyn JobReportsRepo>,
    pub registry: Arc<ContentTypeRegistry>,
    pub cache: Arc<BookmarkCacheService>,
    pub manager: Arc<BookmarkCacheManager>,
    pub reconciler: Arc<OrphanReconciler>,
    pub reconcile_max_retries: u32,
}

impl CommandContext {
    fn content_type_label(&self, id: ContentTypeId) -> String {
        self.registry
            .kind_for(id)
            .map(|kind| kind.as_str().to_string())
            .unwrap_or_else(|| format!("unknown:{id}"))
    }
}

/// Asks the operator a yes/no question before a destructive step.
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool, AppError>;
}

/// Reads the answer from stdin; only `y` or `yes` proceeds.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> Result<bool, AppError> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt} (y/N): ")
            .and_then(|_| stdout.flush())
            .map_err(|err| AppError::unexpected(format!("failed to write prompt: {err}")))?;

        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|err| AppError::unexpected(format!("failed to read answer: {err}")))?;

        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

fn rule(width: usize) -> String {
    "-".repeat(width)
}
