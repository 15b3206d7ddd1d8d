//! # Repository Layer
//!
//! The storage contract the sync engine writes through, and its SeaORM
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PersistenceError;
use crate::models::{pull_request, review};

pub mod database;

pub use database::DatabaseStore;

/// Idempotent storage of synced records and per-repository checkpoints.
///
/// Upserts overwrite whole rows by primary key and do nothing on empty input.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn upsert_pull_requests(
        &self,
        batch: &[pull_request::Model],
    ) -> Result<(), PersistenceError>;

    async fn upsert_reviews(&self, batch: &[review::Model]) -> Result<(), PersistenceError>;

    /// `None` when the repository has never been synced.
    async fn get_checkpoint(&self, repo: &str) -> Result<Option<DateTime<Utc>>, PersistenceError>;

    async fn set_checkpoint(&self, repo: &str, at: DateTime<Utc>) -> Result<(), PersistenceError>;
}
