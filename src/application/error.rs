use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{
        bookmarks::BookmarkServiceError, jobs::TaskWaitError, reconcile::ReconcileError,
        repos::RepoError,
    },
    cache::StoreError,
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] StoreError),
    #[error(transparent)]
    Task(#[from] TaskWaitError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Every message in the source chain, outermost first.
    pub fn messages(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut current = self.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        messages
    }
}

impl From<ReconcileError> for AppError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::InvalidArgument(err) => AppError::Domain(err),
            ReconcileError::Repo(err) => AppError::Repo(err),
        }
    }
}

impl From<BookmarkServiceError> for AppError {
    fn from(error: BookmarkServiceError) -> Self {
        match error {
            BookmarkServiceError::Domain(err) => AppError::Domain(err),
            BookmarkServiceError::Repo(err) => AppError::Repo(err),
            BookmarkServiceError::Lifecycle(crate::cache::LifecycleError::Repo(err)) => {
                AppError::Repo(err)
            }
        }
    }
}
