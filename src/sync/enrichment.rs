//! # Pull Request Enrichment
//!
//! Completes a batch of listed pull requests with the fields the list
//! endpoint does not return: diff statistics, the latest ready-for-review
//! transition and the review history. Pull requests are enriched in
//! parallel up to a fixed worker budget; the batch either completes as a
//! whole or fails on the first error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span};

use super::RepositoryContext;
use crate::error::{FetchError, SyncError};
use crate::github::models::login_of;
use crate::github::{ApiIssueEvent, ApiPullRequest, Payload, PullRequestSource, RepositoryId};
use crate::models::{pull_request, review};

/// Enriched records ready to persist, in input order.
#[derive(Debug, Default, Clone)]
pub struct EnrichedBatch {
    pub pull_requests: Vec<pull_request::Model>,
    pub reviews: Vec<review::Model>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub additions: i64,
    pub deletions: i64,
    pub changed_files: i64,
}

struct EnrichedPullRequest {
    pull_request: pull_request::Model,
    reviews: Vec<review::Model>,
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    source: Arc<dyn PullRequestSource>,
    concurrency: usize,
}

impl EnrichmentPipeline {
    pub fn new(source: Arc<dyn PullRequestSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Enrich every pull request in `batch`, failing the whole batch on the first error.
    pub async fn enrich(
        &self,
        repo: &Arc<RepositoryContext>,
        batch: Vec<Payload<ApiPullRequest>>,
    ) -> Result<EnrichedBatch, SyncError> {
        if batch.is_empty() {
            return Ok(EnrichedBatch::default());
        }

        let total = batch.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, pr) in batch.into_iter().enumerate() {
            let source = self.source.clone();
            let repo = repo.clone();
            let semaphore = semaphore.clone();
            let span = info_span!("enrich_pull_request", pr = pr.item.number);

            tasks.spawn(
                async move {
                    // The semaphore is never closed, so the permit is always granted.
                    let _permit = semaphore.acquire_owned().await;
                    (index, enrich_one(source.as_ref(), &repo, pr).await)
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<EnrichedPullRequest>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(enriched))) => slots[index] = Some(enriched),
                Ok((_, Err(err))) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(SyncError::TaskFailed(join_err));
                }
            }
        }

        let mut out = EnrichedBatch::default();
        for enriched in slots.into_iter().flatten() {
            out.pull_requests.push(enriched.pull_request);
            out.reviews.extend(enriched.reviews);
        }

        debug!(
            pull_requests = out.pull_requests.len(),
            reviews = out.reviews.len(),
            "batch enriched"
        );
        Ok(out)
    }
}

async fn enrich_one(
    source: &dyn PullRequestSource,
    repo: &RepositoryContext,
    pr: Payload<ApiPullRequest>,
) -> Result<EnrichedPullRequest, SyncError> {
    let number = pr.item.number;
    let wrap = |source: FetchError| SyncError::Enrichment { number, source };

    let ready_at = last_ready_for_review(source, &repo.id, number)
        .await
        .map_err(wrap)?;
    let stats = diff_stats(source, &repo.id, number).await.map_err(wrap)?;
    let reviews = reviews(source, repo, pr.item.id, number)
        .await
        .map_err(wrap)?;

    let Payload { item, raw } = pr;
    let pull_request = pull_request::Model {
        pr_id: item.id,
        repo_id: repo.repo_id,
        repo: repo.full_name.clone(),
        number: item.number,
        username: login_of(&item.user),
        title: item.title,
        body: item.body,
        state: item.state,
        draft: item.draft,
        additions: stats.additions,
        deletions: stats.deletions,
        changed_files: stats.changed_files,
        merged_at: item.merged_at.map(|at| at.fixed_offset()),
        created_at: item.created_at.fixed_offset(),
        updated_at: item.updated_at.fixed_offset(),
        last_ready_for_review_at: ready_at.map(|at| at.fixed_offset()),
        data: raw,
    };

    Ok(EnrichedPullRequest {
        pull_request,
        reviews,
    })
}

/// Pages forward only while the upstream reports a later page.
fn advance(current: u32, next: Option<u32>) -> Option<u32> {
    next.filter(|&n| n > current)
}

/// First `ready_for_review` event in the API's default (newest first) order.
pub async fn last_ready_for_review(
    source: &dyn PullRequestSource,
    repo: &RepositoryId,
    number: i64,
) -> Result<Option<DateTime<Utc>>, FetchError> {
    let mut page = 1;
    loop {
        let events = source.issue_events_page(repo, number, page).await?;
        if let Some(event) = events
            .items
            .iter()
            .find(|e| e.event == ApiIssueEvent::READY_FOR_REVIEW)
        {
            return Ok(Some(event.created_at));
        }
        match advance(page, events.next_page) {
            Some(next) => page = next,
            None => return Ok(None),
        }
    }
}

/// Sums line changes over every page of changed files.
pub async fn diff_stats(
    source: &dyn PullRequestSource,
    repo: &RepositoryId,
    number: i64,
) -> Result<DiffStats, FetchError> {
    let mut stats = DiffStats::default();
    let mut page = 1;
    loop {
        let files = source.files_page(repo, number, page).await?;
        for file in &files.items {
            stats.additions += file.additions;
            stats.deletions += file.deletions;
        }
        stats.changed_files += files.items.len() as i64;
        match advance(page, files.next_page) {
            Some(next) => page = next,
            None => return Ok(stats),
        }
    }
}

async fn reviews(
    source: &dyn PullRequestSource,
    repo: &RepositoryContext,
    pr_id: i64,
    number: i64,
) -> Result<Vec<review::Model>, FetchError> {
    let mut out = Vec::new();
    let mut page = 1;
    loop {
        let reviews = source.reviews_page(&repo.id, number, page).await?;
        out.extend(reviews.items.into_iter().map(|Payload { item, raw }| {
            review::Model {
                review_id: item.id,
                pr_id,
                repo: repo.full_name.clone(),
                username: login_of(&item.user),
                state: item.state,
                submitted_at: item.submitted_at.map(|at| at.fixed_offset()),
                commit_id: item.commit_id,
                data: raw,
            }
        }));
        match advance(page, reviews.next_page) {
            Some(next) => page = next,
            None => return Ok(out),
        }
    }
}
