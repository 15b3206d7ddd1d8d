//! Error types surfaced by the sync engine.
//!
//! Lower layers keep their own enums ([`FetchError`], [`ConfigError`],
//! [`RotatorError`]); [`SyncError`] is what a repository sync reports to the
//! sweep driver.

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::github::{FetchError, RotatorError};

/// Failure of a storage operation.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Why a single repository sync stopped.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("enrichment of pull request #{number} failed: {source}")]
    Enrichment {
        number: i64,
        #[source]
        source: FetchError,
    },

    #[error("enrichment task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Fetch(FetchError::PoolExhausted)
            | SyncError::Enrichment {
                source: FetchError::PoolExhausted,
                ..
            } => "pool_exhausted",
            SyncError::Fetch(FetchError::ForbiddenNonRateLimit { .. })
            | SyncError::Enrichment {
                source: FetchError::ForbiddenNonRateLimit { .. },
                ..
            } => "forbidden",
            SyncError::Fetch(_) | SyncError::Enrichment { .. } => "fetch",
            SyncError::Persistence(_) => "persistence",
            SyncError::TaskFailed(_) => "task_failed",
            SyncError::Cancelled => "cancelled",
        }
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(err: sea_orm::DbErr) -> Self {
        SyncError::Persistence(PersistenceError::Database(err))
    }
}
