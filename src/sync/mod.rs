//! Incremental pull request sync.
//!
//! [`SyncOrchestrator`] pages through each repository's pull requests
//! relative to its checkpoint, hands qualifying batches to the
//! [`EnrichmentPipeline`] and persists them through a
//! [`crate::repositories::SyncStore`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::github::{Direction, RepositoryId};

pub mod enrichment;
pub mod orchestrator;

pub use enrichment::{DiffStats, EnrichedBatch, EnrichmentPipeline};
pub use orchestrator::SyncOrchestrator;

/// A repository resolved against the upstream API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    /// Used to build API paths.
    pub id: RepositoryId,
    /// Upstream numeric repository id.
    pub repo_id: i64,
    /// Canonical `owner/name`; keys stored rows and the checkpoint.
    pub full_name: String,
}

/// Outcome of one repository sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositorySyncReport {
    pub repository: String,
    pub direction: Direction,
    pub pages_fetched: u32,
    pub pull_requests_synced: usize,
    pub reviews_synced: usize,
    /// Checkpoint after the sync.
    pub checkpoint: Option<DateTime<Utc>>,
}

/// Outcome of a sweep over every configured repository.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub succeeded: Vec<RepositorySyncReport>,
    pub failed: Vec<(RepositoryId, String)>,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn pull_requests_synced(&self) -> usize {
        self.succeeded.iter().map(|r| r.pull_requests_synced).sum()
    }
}
