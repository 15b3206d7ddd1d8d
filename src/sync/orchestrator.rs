//! # Checkpointed Repository Sync
//!
//! Per repository, pages through pull requests sorted by update time:
//! - With no checkpoint, ascending from the oldest activity inside the
//!   lookback window. The checkpoint advances after every persisted batch,
//!   so an interrupted backfill resumes where it stopped.
//! - With a checkpoint, descending from the newest activity until a page
//!   holds nothing newer than the checkpoint. The checkpoint moves once, at
//!   the end, to the newest update seen.
//!
//! Repositories are synced one after another; a failure aborts only the
//! repository it happened in.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{EnrichmentPipeline, RepositoryContext, RepositorySyncReport, SweepReport};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::github::{ApiPullRequest, Direction, Payload, PullRequestSource, RepositoryId};
use crate::repositories::SyncStore;

pub struct SyncOrchestrator {
    source: Arc<dyn PullRequestSource>,
    store: Arc<dyn SyncStore>,
    enrichment: EnrichmentPipeline,
    lookback: chrono::Duration,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn PullRequestSource>,
        store: Arc<dyn SyncStore>,
        settings: &SyncConfig,
    ) -> Self {
        let enrichment = EnrichmentPipeline::new(source.clone(), settings.enrichment_concurrency);
        Self {
            source,
            store,
            enrichment,
            lookback: settings.lookback(),
        }
    }

    /// Sync every repository in order. Failures are logged and recorded; the
    /// sweep only stops early when cancelled.
    #[instrument(skip_all, fields(repositories = repos.len()))]
    pub async fn run_sweep(
        &self,
        repos: &[RepositoryId],
        cancel: &CancellationToken,
    ) -> SweepReport {
        let sweep_start = Utc::now();
        let mut report = SweepReport::default();

        for repo in repos {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let timer = Instant::now();
            let result = self.sync_repository(repo, sweep_start, cancel).await;
            histogram!("sync_repository_duration_ms").record(timer.elapsed().as_millis() as f64);

            match result {
                Ok(repo_report) => {
                    info!(
                        repository = %repo_report.repository,
                        direction = %repo_report.direction,
                        pages = repo_report.pages_fetched,
                        pull_requests = repo_report.pull_requests_synced,
                        reviews = repo_report.reviews_synced,
                        checkpoint = ?repo_report.checkpoint,
                        "repository synced"
                    );
                    report.succeeded.push(repo_report);
                }
                Err(SyncError::Cancelled) => {
                    warn!(repository = %repo, "sweep cancelled");
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    error!(repository = %repo, error = %err, "repository sync failed");
                    counter!("sync_repository_failures_total", "kind" => err.kind()).increment(1);
                    report.failed.push((repo.clone(), err.to_string()));
                }
            }
        }

        report
    }

    /// Resolve `repo` upstream, then sync it relative to `now`.
    #[instrument(skip_all, fields(repository = %repo))]
    pub async fn sync_repository(
        &self,
        repo: &RepositoryId,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RepositorySyncReport, SyncError> {
        let upstream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            result = self.source.repository(repo) => result?,
        };

        let id = upstream
            .full_name
            .parse::<RepositoryId>()
            .unwrap_or_else(|_| repo.clone());
        let context = Arc::new(RepositoryContext {
            id,
            repo_id: upstream.id,
            full_name: upstream.full_name,
        });

        self.sync_resolved(context, now, cancel).await
    }

    /// The checkpointed pagination over an already resolved repository.
    pub async fn sync_resolved(
        &self,
        repo: Arc<RepositoryContext>,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RepositorySyncReport, SyncError> {
        let checkpoint = self.store.get_checkpoint(&repo.full_name).await?;
        let window_start = now - self.lookback;
        let direction = match checkpoint {
            Some(_) => Direction::Desc,
            None => Direction::Asc,
        };

        debug!(
            ?checkpoint,
            %window_start,
            %direction,
            "starting repository sync"
        );

        let mut report = RepositorySyncReport {
            repository: repo.full_name.clone(),
            direction,
            pages_fetched: 0,
            pull_requests_synced: 0,
            reviews_synced: 0,
            checkpoint,
        };
        let mut newest_seen: Option<DateTime<Utc>> = None;
        let mut page = 1;

        loop {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.source.pull_requests_page(&repo.id, direction, page) => result?,
            };
            report.pages_fetched += 1;

            if fetched.items.is_empty() {
                break;
            }

            let batch: Vec<Payload<ApiPullRequest>> = fetched
                .items
                .into_iter()
                .filter(|pr| qualifies(pr.item.updated_at, window_start, checkpoint))
                .collect();

            if batch.is_empty() {
                if direction == Direction::Desc {
                    debug!(page, "page holds nothing newer than the checkpoint");
                    break;
                }
                debug!(page, "page is outside the lookback window, skipping");
            } else {
                let batch_max = batch.iter().map(|pr| pr.item.updated_at).max();
                self.persist_batch(&repo, batch, &mut report).await?;

                match direction {
                    Direction::Asc => {
                        if let Some(max) = batch_max {
                            self.advance_checkpoint(&repo, max, &mut report).await?;
                        }
                    }
                    Direction::Desc => {
                        if newest_seen.is_none() {
                            newest_seen = batch_max;
                        }
                    }
                }
            }

            match fetched.next_page.filter(|&next| next > page) {
                Some(next) => page = next,
                None => break,
            }
        }

        if let Some(newest) = newest_seen {
            self.advance_checkpoint(&repo, newest, &mut report).await?;
        }

        Ok(report)
    }

    async fn persist_batch(
        &self,
        repo: &Arc<RepositoryContext>,
        batch: Vec<Payload<ApiPullRequest>>,
        report: &mut RepositorySyncReport,
    ) -> Result<(), SyncError> {
        let enriched = self.enrichment.enrich(repo, batch).await?;

        self.store
            .upsert_pull_requests(&enriched.pull_requests)
            .await?;
        self.store.upsert_reviews(&enriched.reviews).await?;

        counter!("sync_pull_requests_persisted_total")
            .increment(enriched.pull_requests.len() as u64);
        counter!("sync_reviews_persisted_total").increment(enriched.reviews.len() as u64);

        report.pull_requests_synced += enriched.pull_requests.len();
        report.reviews_synced += enriched.reviews.len();
        Ok(())
    }

    /// Writes `candidate` only if it moves the checkpoint forward.
    async fn advance_checkpoint(
        &self,
        repo: &RepositoryContext,
        candidate: DateTime<Utc>,
        report: &mut RepositorySyncReport,
    ) -> Result<(), SyncError> {
        if report.checkpoint.is_some_and(|current| candidate <= current) {
            return Ok(());
        }

        self.store.set_checkpoint(&repo.full_name, candidate).await?;
        report.checkpoint = Some(candidate);
        debug!(checkpoint = %candidate, "checkpoint advanced");
        Ok(())
    }
}

/// Inside the lookback window and, when a checkpoint exists, strictly newer than it.
fn qualifies(
    updated_at: DateTime<Utc>,
    window_start: DateTime<Utc>,
    checkpoint: Option<DateTime<Utc>>,
) -> bool {
    updated_at >= window_start && checkpoint.is_none_or(|cp| updated_at > cp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let window = at(2024, 1, 1);
        assert!(qualifies(window, window, None));
        assert!(!qualifies(at(2023, 12, 31), window, None));
    }

    #[test]
    fn checkpoint_boundary_is_exclusive() {
        let window = at(2023, 1, 1);
        let checkpoint = Some(at(2024, 1, 1));
        assert!(!qualifies(at(2024, 1, 1), window, checkpoint));
        assert!(qualifies(at(2024, 1, 2), window, checkpoint));
    }

    #[test]
    fn window_applies_even_with_checkpoint() {
        let window = at(2024, 6, 1);
        let checkpoint = Some(at(2024, 1, 1));
        assert!(!qualifies(at(2024, 3, 1), window, checkpoint));
    }
}
