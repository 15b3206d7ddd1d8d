use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::{
    Mock, MockServer, Request, Respond, ResponseTemplate,
    matchers::{header, method, path, query_param},
};

use syncer::github::{
    CredentialRotator, Direction, FetchError, FetchGateway, GitHubClient, PoolState,
    PullRequestSource, RepositoryId,
};

fn gateway(server: &MockServer, tokens: &[&str]) -> FetchGateway {
    let rotator = Arc::new(CredentialRotator::new(tokens.iter().copied()).unwrap());
    let client = GitHubClient::new(&server.uri()).unwrap();
    FetchGateway::new(client, rotator).with_backoff_buffer(Duration::ZERO)
}

fn widgets() -> RepositoryId {
    "octo/widgets".parse().unwrap()
}

fn repository_body() -> serde_json::Value {
    json!({
        "id": 42,
        "name": "widgets",
        "full_name": "octo/widgets",
        "owner": {"login": "octo"}
    })
}

fn rate_limited(reset_epoch: i64) -> ResponseTemplate {
    ResponseTemplate::new(403)
        .insert_header("X-RateLimit-Remaining", "0")
        .insert_header("X-RateLimit-Reset", reset_epoch.to_string().as_str())
        .set_body_json(json!({"message": "API rate limit exceeded"}))
}

#[tokio::test]
async fn rate_limited_credential_rotates_to_next() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .and(header("authorization", "Bearer t1"))
        .respond_with(rate_limited(Utc::now().timestamp() + 3600))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .and(header("authorization", "Bearer t2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "4999")
                .set_body_json(repository_body()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1", "t2"]);
    let repo = gateway.repository(&widgets()).await.unwrap();

    assert_eq!(repo.id, 42);
    assert_eq!(repo.full_name, "octo/widgets");
    assert_eq!(gateway.rotator().state(), PoolState::Active(1));
}

#[tokio::test]
async fn forbidden_with_remaining_quota_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("X-RateLimit-Remaining", "12")
                .set_body_json(json!({"message": "Resource not accessible by integration"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1", "t2"]);
    let err = gateway.repository(&widgets()).await.unwrap_err();

    match err {
        FetchError::ForbiddenNonRateLimit { message } => {
            assert_eq!(message, "Resource not accessible by integration");
        }
        other => panic!("expected ForbiddenNonRateLimit, got {other:?}"),
    }
    assert_eq!(gateway.rotator().state(), PoolState::Active(0));
}

#[tokio::test]
async fn forbidden_without_quota_header_is_not_a_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1"]);
    let err = gateway.repository(&widgets()).await.unwrap_err();

    assert!(matches!(err, FetchError::ForbiddenNonRateLimit { .. }));
}

#[tokio::test]
async fn other_statuses_fail_immediately() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1", "t2"]);
    let err = gateway.repository(&widgets()).await.unwrap_err();

    match err {
        FetchError::UnexpectedStatus { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let rotator = Arc::new(CredentialRotator::new(["t1"]).unwrap());
    let client = GitHubClient::new("http://127.0.0.1:1").unwrap();
    let gateway = FetchGateway::new(client, rotator);

    let err = gateway.repository(&widgets()).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1"]);
    let err = gateway.repository(&widgets()).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
}

#[tokio::test]
async fn listing_sends_paging_and_sort_parameters() {
    let server = MockServer::start().await;
    let next = format!(
        "<{uri}/repos/octo/widgets/pulls?state=all&page=3>; rel=\"next\", \
         <{uri}/repos/octo/widgets/pulls?state=all&page=9>; rel=\"last\"",
        uri = server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/pulls"))
        .and(query_param("state", "all"))
        .and(query_param("sort", "updated"))
        .and(query_param("direction", "desc"))
        .and(query_param("per_page", "50"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([{
                    "id": 9001,
                    "number": 7,
                    "user": {"login": "hubot"},
                    "title": "Add widgets",
                    "body": null,
                    "state": "open",
                    "merged_at": null,
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-02-01T00:00:00Z",
                    "labels": [{"name": "enhancement"}]
                }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1"]).with_page_size(50);
    let page = gateway
        .pull_requests_page(&widgets(), Direction::Desc, 2)
        .await
        .unwrap();

    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.items.len(), 1);
    let pr = &page.items[0];
    assert_eq!(pr.item.number, 7);
    assert!(!pr.item.draft);
    assert_eq!(pr.raw["labels"][0]["name"], "enhancement");
}

#[tokio::test]
async fn requests_carry_api_headers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/pulls/7/files"))
        .and(header("authorization", "Bearer secret-token"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"filename": "a.rs", "additions": 3, "deletions": 1}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["secret-token"]);
    let page = gateway.files_page(&widgets(), 7, 1).await.unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.next_page, None);
}

#[tokio::test]
async fn single_exhausted_credential_waits_for_reset() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(rate_limited(Utc::now().timestamp() - 1))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_body()))
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1"]);
    let repo = gateway.repository(&widgets()).await.unwrap();

    assert_eq!(repo.id, 42);
    assert_eq!(gateway.rotator().state(), PoolState::Active(0));
}

#[tokio::test]
async fn retry_ceiling_reports_pool_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(rate_limited(Utc::now().timestamp() - 1))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway(&server, &["t1", "t2"]).with_retry_multiplier(1);
    assert_eq!(gateway.max_attempts(), 2);

    let err = gateway.repository(&widgets()).await.unwrap_err();
    assert!(matches!(err, FetchError::PoolExhausted));
}

/// Rate limits every other request with an already elapsed reset time.
struct AlternatingRateLimit {
    requests: AtomicUsize,
}

impl Respond for AlternatingRateLimit {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.requests.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            rate_limited(Utc::now().timestamp() - 1)
        } else {
            ResponseTemplate::new(200).set_body_json(repository_body())
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_wait_out_backoff_instead_of_failing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets"))
        .respond_with(AlternatingRateLimit {
            requests: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let gateway = Arc::new(gateway(&server, &["t1"]).with_retry_multiplier(1000));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let mut failures = Vec::new();
                for _ in 0..100 {
                    if let Err(err) = gateway.repository(&widgets()).await {
                        failures.push(err.to_string());
                    }
                }
                failures
            })
        })
        .collect();

    let mut failures = Vec::new();
    for worker in workers {
        failures.extend(worker.await.unwrap());
    }

    assert!(failures.is_empty(), "rate limits surfaced: {failures:?}");
    assert_eq!(gateway.rotator().state(), PoolState::Active(0));
}
