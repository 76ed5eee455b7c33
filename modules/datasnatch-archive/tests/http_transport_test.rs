use std::sync::Arc;
use std::time::Duration;

use datasnatch_archive::{ExponentialBackoff, FetchTransport, Fetcher, FetcherConfig, HttpTransport};
use datasnatch_common::file_config::FetchConfig;
use datasnatch_common::{FetchError, FetchTask};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    HttpTransport::new(&FetchConfig::default()).unwrap()
}

fn quick_fetcher(transport: HttpTransport) -> Fetcher {
    Fetcher::new(
        Arc::new(transport),
        FetcherConfig {
            concurrency: 4,
            request_timeout: Duration::from_millis(500),
            max_attempts: 3,
            max_rate_limited_attempts: 3,
            backoff: ExponentialBackoff::new(10, 50).with_jitter(0),
            retry_after_max: Duration::from_secs(1),
        },
    )
}

#[tokio::test]
async fn transport_returns_status_body_and_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<h1 class=\"profile-name\">Jane</h1>")
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
        .mount(&server)
        .await;

    let t = transport();
    let ok = t.get(&format!("{}/profile/1", server.uri())).await.unwrap();
    assert_eq!(ok.status, 200);
    assert!(String::from_utf8_lossy(&ok.body).contains("Jane"));

    let busy = t.get(&format!("{}/busy", server.uri())).await.unwrap();
    assert_eq!(busy.status, 429);
    assert_eq!(busy.retry_after, Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn unreachable_host_is_connection_failure() {
    let t = transport();
    let err = t.get("http://127.0.0.1:9/").await.unwrap_err();
    assert!(matches!(err, FetchError::ConnectionFailed(_) | FetchError::Timeout));
}

#[tokio::test]
async fn fetcher_retries_server_errors_against_real_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .mount(&server)
        .await;

    let fetcher = quick_fetcher(transport());
    let page = fetcher
        .fetch(FetchTask::new(format!("{}/flaky", server.uri())))
        .await
        .unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.text(), "recovered");
}

#[tokio::test]
async fn fetcher_times_out_slow_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let fetcher = quick_fetcher(transport());
    let err = fetcher
        .fetch(FetchTask::new(format!("{}/slow", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::Timeout);
}

#[tokio::test]
async fn fetcher_does_not_retry_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = quick_fetcher(transport());
    let err = fetcher
        .fetch(FetchTask::new(format!("{}/missing", server.uri())))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::HttpStatus(404));
}
