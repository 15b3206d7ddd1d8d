//! GitHub access for the syncer.
//!
//! [`CredentialRotator`] owns the token pool, [`GitHubClient`] performs single
//! requests and [`FetchGateway`] combines the two into rate-limit aware
//! calls. Everything above this module talks to GitHub through the
//! [`PullRequestSource`] trait.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod client;
pub mod gateway;
pub mod models;
pub mod repository;
pub mod rotator;

pub use client::{GitHubClient, InvalidBaseUrl, RateLimitInfo};
pub use gateway::{FetchError, FetchGateway};
pub use models::{ApiFile, ApiIssueEvent, ApiPullRequest, ApiRepository, ApiReview, Payload};
pub use repository::{RepositoryId, RepositoryIdError};
pub use rotator::{Credential, CredentialRotator, Lease, PoolState, RotatorError};

/// Sort direction for the pull request listing, by update time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page of a list endpoint. `next_page` is `None` on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

/// The upstream operations the sync engine depends on.
///
/// Pages are numbered from 1.
#[async_trait]
pub trait PullRequestSource: Send + Sync {
    async fn repository(&self, repo: &RepositoryId) -> Result<ApiRepository, FetchError>;

    /// Pull requests in every state, sorted by update time.
    async fn pull_requests_page(
        &self,
        repo: &RepositoryId,
        direction: Direction,
        page: u32,
    ) -> Result<Page<Payload<ApiPullRequest>>, FetchError>;

    /// Issue events for a pull request, newest first.
    async fn issue_events_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiIssueEvent>, FetchError>;

    async fn files_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<ApiFile>, FetchError>;

    async fn reviews_page(
        &self,
        repo: &RepositoryId,
        number: i64,
        page: u32,
    ) -> Result<Page<Payload<ApiReview>>, FetchError>;
}
