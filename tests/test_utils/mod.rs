//! Test utilities shared by the integration suites.
//!
//! Provides an in-memory SQLite database with migrations applied and a
//! scripted, in-memory [`PullRequestSource`].

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;

use syncer::github::{
    ApiFile, ApiIssueEvent, ApiPullRequest, ApiRepository, ApiReview, Direction, FetchError,
    Page, Payload, PullRequestSource, RepositoryId,
};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn repo_id(s: &str) -> RepositoryId {
    s.parse().unwrap()
}

/// A listed pull request as GitHub would return it.
pub fn pull_request(id: i64, number: i64, updated_at: DateTime<Utc>) -> Payload<ApiPullRequest> {
    serde_json::from_value(json!({
        "id": id,
        "number": number,
        "user": {"login": format!("author{number}")},
        "title": format!("PR #{number}"),
        "body": "Description",
        "state": "open",
        "draft": false,
        "merged_at": null,
        "created_at": "2023-01-01T00:00:00Z",
        "updated_at": updated_at.to_rfc3339(),
    }))
    .unwrap()
}

pub fn event(kind: &str, at: DateTime<Utc>) -> ApiIssueEvent {
    ApiIssueEvent {
        event: kind.to_string(),
        created_at: at,
    }
}

pub fn file(additions: i64, deletions: i64) -> ApiFile {
    ApiFile {
        filename: "src/lib.rs".to_string(),
        additions,
        deletions,
    }
}

pub fn review(id: i64, login: &str, state: &str, submitted_at: Option<DateTime<Utc>>) -> Payload<ApiReview> {
    serde_json::from_value(json!({
        "id": id,
        "user": {"login": login},
        "state": state,
        "submitted_at": submitted_at.map(|t| t.to_rfc3339()),
        "commit_id": "abc123",
        "body": "",
    }))
    .unwrap()
}

fn paged<T: Clone>(pages: &[Vec<T>], page: u32) -> Page<T> {
    let index = page.saturating_sub(1) as usize;
    let items = pages.get(index).cloned().unwrap_or_default();
    let next_page = (index + 1 < pages.len()).then_some(page + 1);
    Page { items, next_page }
}

/// Scripted upstream. Pull request listings are shared by every repository;
/// per-PR data is keyed by pull request number.
#[derive(Default)]
pub struct FakeSource {
    pub asc_pages: Vec<Vec<Payload<ApiPullRequest>>>,
    pub desc_pages: Vec<Vec<Payload<ApiPullRequest>>>,
    pub events: HashMap<i64, Vec<Vec<ApiIssueEvent>>>,
    pub files: HashMap<i64, Vec<Vec<ApiFile>>>,
    pub reviews: HashMap<i64, Vec<Vec<Payload<ApiReview>>>>,
    pub failing_files: HashSet<i64>,
    pub failing_pull_request_pages: HashSet<u32>,
    pub missing_repositories: HashSet<String>,
    /// Held inside every `files_page` call, to keep enrichments overlapping.
    pub files_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    files_in_flight: AtomicUsize,
    peak_files_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asc_pages(mut self, pages: Vec<Vec<Payload<ApiPullRequest>>>) -> Self {
        self.asc_pages = pages;
        self
    }

    pub fn with_desc_pages(mut self, pages: Vec<Vec<Payload<ApiPullRequest>>>) -> Self {
        self.desc_pages = pages;
        self
    }

    pub fn with_events(mut self, number: i64, pages: Vec<Vec<ApiIssueEvent>>) -> Self {
        self.events.insert(number, pages);
        self
    }

    pub fn with_files(mut self, number: i64, pages: Vec<Vec<ApiFile>>) -> Self {
        self.files.insert(number, pages);
        self
    }

    pub fn with_reviews(mut self, number: i64, pages: Vec<Vec<Payload<ApiReview>>>) -> Self {
        self.reviews.insert(number, pages);
        self
    }

    pub fn failing_files_for(mut self, number: i64) -> Self {
        self.failing_files.insert(number);
        self
    }

    pub fn failing_pull_request_page(mut self, page: u32) -> Self {
        self.failing_pull_request_pages.insert(page);
        self
    }

    pub fn with_files_delay(mut self, delay: Duration) -> Self {
        self.files_delay = Some(delay);
        self
    }

    /// Highest number of `files_page` calls that were running at once.
    pub fn peak_files_in_flight(&self) -> usize {
        self.peak_files_in_flight.load(Ordering::SeqCst)
    }

    pub fn missing_repository(mut self, full_name: &str) -> Self {
        self.missing_repositories.insert(full_name.to_string());
        self
    }

    fn record(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Every call made so far, e.g. `pulls:desc:2` or `files:7:1`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl PullRequestSource for FakeSource {
    async fn repository(&self, repo: &RepositoryId) -> Result<ApiRepository, FetchError> {
        self.record(format!("repo:{repo}"));
        if self.missing_repositories.contains(&repo.full_name()) {
            return Err(FetchError::UnexpectedStatus {
                status: 404,
                message: "Not Found".to_string(),
            });
        }
        Ok(serde_json::from_value(json!({
            "id": 1000,
            "name": repo.name(),
            "full_name": repo.full_name(),
            "owner": {"login": repo.owner()},
        }))
        .unwrap())
    }

    async fn pull_requests_page(
        &self,
        _repo: &RepositoryId,
        direction: Direction,
        page: u32,
    ) -> Result<Page<Payload<ApiPullRequest>>, FetchError> {
        self.record(format!("pulls:{direction}:{page}"));
        if self.failing_pull_request_pages.contains(&page) {
            return Err(FetchError::UnexpectedStatus {
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        let pages = match direction {
            Direction::Asc => &self.asc_pages,
            Direction::Desc => &self.desc_pages,
        };
        Ok(paged(pages, page))
    }

    async fn issue_events_page(
        &self,
        _repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiIssueEvent>, FetchError> {
        self.record(format!("events:{number}:{page}"));
        Ok(paged(
            self.events.get(&number).map(Vec::as_slice).unwrap_or_default(),
            page,
        ))
    }

    async fn files_page(
        &self,
        _repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiFile>, FetchError> {
        self.record(format!("files:{number}:{page}"));

        let running = self.files_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_files_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.files_delay {
            tokio::time::sleep(delay).await;
        }
        self.files_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_files.contains(&number) {
            return Err(FetchError::ForbiddenNonRateLimit {
                message: "Resource not accessible by integration".to_string(),
            });
        }
        Ok(paged(
            self.files.get(&number).map(Vec::as_slice).unwrap_or_default(),
            page,
        ))
    }

    async fn reviews_page(
        &self,
        _repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<Payload<ApiReview>>, FetchError> {
        self.record(format!("reviews:{number}:{page}"));
        Ok(paged(
            self.reviews.get(&number).map(Vec::as_slice).unwrap_or_default(),
            page,
        ))
    }
}
