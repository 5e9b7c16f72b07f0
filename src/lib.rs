//! Per-user bookmark cache in front of a relational bookmarks table, with the
//! lifecycle hooks that keep it consistent and an orphan reconciliation job.

pub mod application;
pub mod cache;
pub mod commands;
pub mod config;
pub mod domain;
pub mod infra;
