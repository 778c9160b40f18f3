//! Session and API client against a local HTTP server.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ghlink::clock::SystemClock;
use ghlink::config::Config;
use ghlink::github::{ApiError, IssueListParams, IssueStatus};
use ghlink::http_client::ReqwestTransport;
use ghlink::notify::RecordingNotifier;
use ghlink::session::Session;
use ghlink::storage::{JsonFileStore, MemoryStore, DATA_VERSION};

fn issue_body() -> serde_json::Value {
    json!({
        "number": 7,
        "title": "Links render twice",
        "state": "closed",
        "state_reason": "completed",
        "html_url": "https://github.com/octo/hello/issues/7",
        "labels": [{"name": "bug"}]
    })
}

fn overlay(server: &MockServer, min_request_seconds: u64) -> Config {
    Config {
        api_base_url: Some(server.uri()),
        min_request_seconds: Some(min_request_seconds),
        ..Default::default()
    }
}

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(std::time::Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn test_issue_is_fetched_once_then_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/7"))
        .and(header("accept", "application/vnd.github+json"))
        .and(header("x-github-api-version", "2022-11-28"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(issue_body())
                .insert_header("etag", "\"v1\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let session = Session::open(
        store.clone(),
        Arc::new(SystemClock),
        notifier,
        &overlay(&server, 60),
    )
    .await
    .unwrap();
    let api = session.build_api(transport());

    let first = api.fetch_issue("octo", "hello", 7).await.unwrap();
    let second = api.fetch_issue("octo", "hello", 7).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.status(), IssueStatus::Done);

    assert_eq!(session.save_if_dirty().await.unwrap(), Some(1));
    let saved = store.data().unwrap();
    assert_eq!(saved.data_version, Some(DATA_VERSION));
    assert_eq!(saved.cache.unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_entry_is_revalidated_across_sessions() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("ghlink.json");

    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/7"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(issue_body())
                .insert_header("etag", "\"v1\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    {
        let session = Session::open(
            Arc::new(JsonFileStore::new(&data_path)),
            Arc::new(SystemClock),
            Arc::new(RecordingNotifier::new()),
            &overlay(&server, 0),
        )
        .await
        .unwrap();
        let api = session.build_api(transport());
        api.fetch_issue("octo", "hello", 7).await.unwrap();
        session.save().await.unwrap();
    }

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues/7"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::open(
        Arc::new(JsonFileStore::new(&data_path)),
        Arc::new(SystemClock),
        Arc::new(RecordingNotifier::new()),
        &overlay(&server, 0),
    )
    .await
    .unwrap();
    assert_eq!(session.cache().read().await.len(), 1);

    let api = session.build_api(transport());
    let issue = api.fetch_issue("octo", "hello", 7).await.unwrap();
    assert_eq!(issue.title, "Links render twice");
}

#[tokio::test]
async fn test_exhausted_rate_limit_refuses_further_calls() {
    let server = MockServer::start().await;
    let reset = (Utc::now().timestamp() + 600).to_string();

    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues"))
        .and(query_param("per_page", "10"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"message": "API rate limit exceeded"}))
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Arc::new(RecordingNotifier::new());
    let session = Session::open(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        notifier.clone(),
        &overlay(&server, 60),
    )
    .await
    .unwrap();
    let api = session.build_api(transport());
    let params = IssueListParams::default();

    let first = api
        .list_issues("octo", "hello", &params, false)
        .await
        .unwrap_err();
    assert_eq!(first.status(), Some(403));

    let second = api
        .list_issues("octo", "hello", &params, false)
        .await
        .unwrap_err();
    assert!(matches!(second, ApiError::RateLimited { authenticated: false, .. }));

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("GitHub rate limit exceeded."));
    assert!(session.cache().read().await.is_empty());
}

#[tokio::test]
async fn test_list_pagination_comes_from_link_header() {
    let server = MockServer::start().await;
    let next = format!(
        "<{}/repos/octo/hello/issues?page=2&per_page=10>; rel=\"next\", <{}/repos/octo/hello/issues?page=4&per_page=10>; rel=\"last\"",
        server.uri(),
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/repos/octo/hello/issues"))
        .and(query_param("labels", "bug,ui"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([issue_body()]))
                .insert_header("link", next.as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::open(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        Arc::new(RecordingNotifier::new()),
        &overlay(&server, 60),
    )
    .await
    .unwrap();
    let api = session.build_api(transport());
    let params = IssueListParams {
        labels: vec!["bug".to_string(), "ui".to_string()],
        ..Default::default()
    };

    let page = api
        .list_issues("octo", "hello", &params, false)
        .await
        .unwrap();
    assert_eq!(page.response.len(), 1);
    assert_eq!(page.meta.next.as_ref().map(|l| l.page), Some(2));
    assert_eq!(page.meta.last.as_ref().map(|l| l.page), Some(4));
    assert!(page.meta.prev.is_none());
}
