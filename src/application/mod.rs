//! Application services: the bookmark write path, orphan reconciliation and
//! background jobs.

pub mod bookmarks;
pub mod error;
pub mod jobs;
pub mod reconcile;
pub mod repos;
