//! Rate-limit aware fetches on top of [`GitHubClient`].
//!
//! Each call retries across the credential pool while GitHub answers
//! `403` with an empty quota, backing off once every credential is spent.
//! Any other failure is returned to the caller untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, gauge};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::client::{ApiResponse, GitHubClient, RateLimitInfo};
use super::models::{ApiFile, ApiIssueEvent, ApiPullRequest, ApiRepository, ApiReview, Payload};
use super::rotator::CredentialRotator;
use super::{Direction, Page, PullRequestSource, RepositoryId};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all credentials are rate limited")]
    PoolExhausted,
    #[error("GitHub denied the request: {message}")]
    ForbiddenNonRateLimit { message: String },
    #[error("GitHub returned unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode GitHub response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Outcome of a single request, as the retry loop sees it.
enum Attempt<T> {
    Done(T, Option<u32>),
    RateLimited(RateLimitInfo),
}

pub struct FetchGateway {
    client: GitHubClient,
    rotator: Arc<CredentialRotator>,
    page_size: u32,
    backoff_buffer: Duration,
    retry_multiplier: u32,
}

impl FetchGateway {
    pub fn new(client: GitHubClient, rotator: Arc<CredentialRotator>) -> Self {
        Self {
            client,
            rotator,
            page_size: 100,
            backoff_buffer: Duration::from_secs(10),
            retry_multiplier: 3,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }

    pub fn with_backoff_buffer(mut self, buffer: Duration) -> Self {
        self.backoff_buffer = buffer;
        self
    }

    pub fn with_retry_multiplier(mut self, multiplier: u32) -> Self {
        self.retry_multiplier = multiplier.max(1);
        self
    }

    pub fn rotator(&self) -> &Arc<CredentialRotator> {
        &self.rotator
    }

    /// Attempts allowed per call before giving up with `PoolExhausted`.
    pub fn max_attempts(&self) -> u32 {
        let pool = u32::try_from(self.rotator.len()).unwrap_or(u32::MAX);
        pool.saturating_mul(self.retry_multiplier).max(1)
    }

    /// Fetch a single resource.
    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, FetchError> {
        let url = self.client.endpoint(segments, &[]);
        let (value, _) = self.execute(url).await?;
        Ok(value)
    }

    /// Fetch one page of a list endpoint.
    pub async fn list<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        page: u32,
    ) -> Result<Page<T>, FetchError> {
        let mut params: Vec<(&str, String)> = query.to_vec();
        params.push(("per_page", self.page_size.to_string()));
        params.push(("page", page.max(1).to_string()));

        let url = self.client.endpoint(segments, &params);
        let (items, next_page) = self.execute::<Vec<T>>(url).await?;
        Ok(Page { items, next_page })
    }

    async fn execute<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<u32>), FetchError> {
        let max_attempts = self.max_attempts();

        for attempt in 1..=max_attempts {
            let Some(lease) = self.rotator.acquire().await else {
                counter!("github_requests_total", "outcome" => "pool_exhausted").increment(1);
                return Err(FetchError::PoolExhausted);
            };

            let response = match self.client.get(&lease.credential, url.clone()).await {
                Ok(response) => response,
                Err(err) => {
                    counter!("github_requests_total", "outcome" => "transport_error").increment(1);
                    return Err(FetchError::Transport(err));
                }
            };

            match Self::classify(response)? {
                Attempt::Done(value, next_page) => return Ok((value, next_page)),
                Attempt::RateLimited(rate_limit) => {
                    warn!(
                        attempt,
                        max_attempts,
                        credential = lease.index,
                        reset_at = ?rate_limit.reset,
                        path = url.path(),
                        "rate limited, rotating credential"
                    );

                    let wait = rate_limit.backoff(Utc::now(), self.backoff_buffer);
                    self.rotator.rotate_after_rate_limit(&lease, wait).await;
                }
            }
        }

        warn!(max_attempts, path = url.path(), "retry ceiling reached");
        counter!("github_requests_total", "outcome" => "pool_exhausted").increment(1);
        Err(FetchError::PoolExhausted)
    }

    fn classify<T: DeserializeOwned>(response: ApiResponse) -> Result<Attempt<T>, FetchError> {
        if let Some(remaining) = response.rate_limit.remaining {
            debug!(remaining, reset_at = ?response.rate_limit.reset, "GitHub quota");
            gauge!("github_rate_limit_remaining").set(f64::from(remaining));
        }

        let status = response.status;
        if status.is_success() {
            counter!("github_requests_total", "outcome" => "success").increment(1);
            let value = serde_json::from_slice(&response.body)?;
            return Ok(Attempt::Done(value, response.next_page));
        }

        if status == StatusCode::FORBIDDEN {
            if response.rate_limit.remaining == Some(0) {
                counter!("github_requests_total", "outcome" => "rate_limited").increment(1);
                return Ok(Attempt::RateLimited(response.rate_limit));
            }
            counter!("github_requests_total", "outcome" => "forbidden").increment(1);
            return Err(FetchError::ForbiddenNonRateLimit {
                message: response.error_message(),
            });
        }

        counter!("github_requests_total", "outcome" => "unexpected_status").increment(1);
        Err(FetchError::UnexpectedStatus {
            status: status.as_u16(),
            message: response.error_message(),
        })
    }
}

#[async_trait]
impl PullRequestSource for FetchGateway {
    async fn repository(&self, repo: &RepositoryId) -> Result<ApiRepository, FetchError> {
        self.get(&["repos", repo.owner(), repo.name()]).await
    }

    async fn pull_requests_page(
        &self,
        repo: &RepositoryId,
        direction: Direction,
        page: u32,
    ) -> Result<Page<Payload<ApiPullRequest>>, FetchError> {
        self.list(
            &["repos", repo.owner(), repo.name(), "pulls"],
            &[
                ("state", "all".to_string()),
                ("sort", "updated".to_string()),
                ("direction", direction.as_str().to_string()),
            ],
            page,
        )
        .await
    }

    async fn issue_events_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiIssueEvent>, FetchError> {
        let number = number.to_string();
        self.list(
            &["repos", repo.owner(), repo.name(), "issues", &number, "events"],
            &[],
            page,
        )
        .await
    }

    async fn files_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiFile>, FetchError> {
        let number = number.to_string();
        self.list(
            &["repos", repo.owner(), repo.name(), "pulls", &number, "files"],
            &[],
            page,
        )
        .await
    }

    async fn reviews_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<Payload<ApiReview>>, FetchError> {
        let number = number.to_string();
        self.list(
            &["repos", repo.owner(), repo.name(), "pulls", &number, "reviews"],
            &[],
            page,
        )
        .await
    }
}
