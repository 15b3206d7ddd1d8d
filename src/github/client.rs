//! Single-attempt HTTP access to the GitHub REST API.
//!
//! The client performs exactly one request per call and reports what came
//! back: status, quota headers, pagination and body. Deciding whether a
//! response is a rate limit is left to [`super::FetchGateway`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{StatusCode, header::HeaderMap};
use serde::Deserialize;
use url::Url;

use super::rotator::Credential;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("syncer/", env!("CARGO_PKG_VERSION"));

/// Quota headers attached to every API response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            remaining: headers
                .get("X-RateLimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            reset: headers
                .get("X-RateLimit-Reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .and_then(|timestamp| DateTime::from_timestamp(timestamp, 0)),
        }
    }

    /// How long to wait before the quota refills, plus `buffer`.
    pub fn backoff(&self, now: DateTime<Utc>, buffer: Duration) -> Duration {
        let until_reset = self
            .reset
            .and_then(|reset| (reset - now).to_std().ok())
            .unwrap_or_default();
        until_reset + buffer
    }
}

/// Everything the gateway needs from one response.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub rate_limit: RateLimitInfo,
    pub next_page: Option<u32>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// The `message` field of a GitHub error body, or the raw text.
    pub fn error_message(&self) -> String {
        #[derive(Deserialize)]
        struct ErrorBody {
            message: String,
        }

        serde_json::from_slice::<ErrorBody>(&self.body)
            .map(|b| b.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&self.body).into_owned())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("GitHub API base URL '{0}' cannot carry a path")]
pub struct InvalidBaseUrl(pub String);

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
}

impl GitHubClient {
    pub fn new(api_base: &str) -> Result<Self, InvalidBaseUrl> {
        let api_base = Url::parse(api_base.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| InvalidBaseUrl(api_base.to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_base,
        })
    }

    /// Builds `{api_base}/{segments...}?{query}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    /// One authenticated GET. Errors only when no response could be read.
    pub async fn get(&self, credential: &Credential, url: Url) -> Result<ApiResponse, reqwest::Error> {
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.expose())
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        let rate_limit = RateLimitInfo::from_headers(response.headers());
        let next_page = response
            .headers()
            .get("Link")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_link_header)
            .and_then(|next| page_number(&next));
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            rate_limit,
            next_page,
            body,
        })
    }
}

/// Extracts the `rel="next"` URL from a GitHub `Link` header.
pub fn parse_link_header(link_header: &str) -> Option<String> {
    // <https://api.github.com/resource?page=2>; rel="next", <...>; rel="last"
    for link in link_header.split(',') {
        let mut parts = link.split(';');
        let url_part = parts.next()?.trim();
        if parts.any(|p| p.trim() == "rel=\"next\"")
            && let Some(start) = url_part.find('<')
            && let Some(end) = url_part.find('>')
        {
            return Some(url_part[start + 1..end].to_string());
        }
    }
    None
}

fn page_number(url: &str) -> Option<u32> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok())
}
