//! # Database Store
//!
//! [`SyncStore`] over a SeaORM connection. Postgres in production, SQLite
//! for local runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, Iterable, Set, TransactionTrait,
};
use tracing::debug;

use super::SyncStore;
use crate::error::PersistenceError;
use crate::models::{
    PullRequest, Review, SyncCheckpoint, pull_request, review, sync_checkpoint,
};

/// Rows per INSERT statement; keeps bind parameters well under SQLite's limit.
const UPSERT_CHUNK: usize = 200;

#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncStore for DatabaseStore {
    async fn upsert_pull_requests(
        &self,
        batch: &[pull_request::Model],
    ) -> Result<(), PersistenceError> {
        if batch.is_empty() {
            return Ok(());
        }

        let on_conflict = OnConflict::column(pull_request::Column::PrId)
            .update_columns(
                pull_request::Column::iter()
                    .filter(|c| !matches!(c, pull_request::Column::PrId)),
            )
            .to_owned();

        let txn = self.db.begin().await?;
        for chunk in batch.chunks(UPSERT_CHUNK) {
            let rows = chunk
                .iter()
                .cloned()
                .map(|m| pull_request::ActiveModel::from(m).reset_all());
            PullRequest::insert_many(rows)
                .on_conflict(on_conflict.clone())
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        debug!(rows = batch.len(), "upserted pull requests");
        Ok(())
    }

    async fn upsert_reviews(&self, batch: &[review::Model]) -> Result<(), PersistenceError> {
        if batch.is_empty() {
            return Ok(());
        }

        let on_conflict = OnConflict::column(review::Column::ReviewId)
            .update_columns(
                review::Column::iter().filter(|c| !matches!(c, review::Column::ReviewId)),
            )
            .to_owned();

        let txn = self.db.begin().await?;
        for chunk in batch.chunks(UPSERT_CHUNK) {
            let rows = chunk
                .iter()
                .cloned()
                .map(|m| review::ActiveModel::from(m).reset_all());
            Review::insert_many(rows)
                .on_conflict(on_conflict.clone())
                .exec_without_returning(&txn)
                .await?;
        }
        txn.commit().await?;

        debug!(rows = batch.len(), "upserted reviews");
        Ok(())
    }

    async fn get_checkpoint(&self, repo: &str) -> Result<Option<DateTime<Utc>>, PersistenceError> {
        let row = SyncCheckpoint::find_by_id(repo.to_string())
            .one(&self.db)
            .await?;
        Ok(row
            .and_then(|m| m.last_synced)
            .map(|at| at.with_timezone(&Utc)))
    }

    async fn set_checkpoint(&self, repo: &str, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let row = sync_checkpoint::ActiveModel {
            repo: Set(repo.to_string()),
            last_synced: Set(Some(at.fixed_offset())),
        };

        SyncCheckpoint::insert(row)
            .on_conflict(
                OnConflict::column(sync_checkpoint::Column::Repo)
                    .update_column(sync_checkpoint::Column::LastSynced)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(repo, checkpoint = %at, "checkpoint written");
        Ok(())
    }
}
