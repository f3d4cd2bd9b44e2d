use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use infra_hunter::client::{ProbeClient, ProbeTarget};
use infra_hunter::config::ProbeConfig;

fn test_config() -> ProbeConfig {
    ProbeConfig {
        token: None,
        request_delay: Duration::from_millis(10),
        retry_delay: Duration::from_millis(300),
        retries: 3,
        timeout: Duration::from_secs(5),
        workers: 4,
    }
}

fn test_client(config: &ProbeConfig) -> ProbeClient {
    ProbeClient::new(config, CancellationToken::new())
}

fn http_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut response = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str(&format!("content-length: {}\r\n", body.len()));
    response.push_str("connection: close\r\n\r\n");
    response.push_str(body);
    response
}

/// Serve one scripted response per connection, in order, repeating the last
/// one for any further connections. Returns the bound address and a counter
/// of connections handled.
async fn scripted_server(responses: Vec<String>) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let server_hits = hits.clone();

    tokio::spawn(async move {
        let mut served = 0usize;
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { break };
            let response = responses[served.min(responses.len() - 1)].clone();
            served += 1;
            server_hits.fetch_add(1, Ordering::SeqCst);

            let mut buf = [0u8; 8192];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (addr, hits)
}

#[tokio::test]
async fn rate_limited_request_honors_retry_after() {
    let (addr, hits) = scripted_server(vec![
        http_response("429 Too Many Requests", &[("retry-after", "2")], ""),
        http_response("200 OK", &[("content-type", "application/json")], "{\"ok\": true}"),
    ])
    .await;

    let client = test_client(&test_config());
    let start = Instant::now();
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/probe"))).await;

    assert!(start.elapsed() >= Duration::from_secs(2), "must wait the server-provided delay");
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.body, Some(json!({"ok": true})));
    assert!(outcome.error.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_without_retry_after_uses_default_delay() {
    let (addr, hits) = scripted_server(vec![
        http_response("429 Too Many Requests", &[], ""),
        http_response("200 OK", &[], "{\"ok\": true}"),
    ])
    .await;

    let config = test_config();
    let client = test_client(&config);
    let start = Instant::now();
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/probe"))).await;

    assert!(start.elapsed() >= config.retry_delay);
    assert_eq!(outcome.status, Some(200));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rate_limit_exhausts_shared_budget() {
    let (addr, hits) = scripted_server(vec![http_response(
        "429 Too Many Requests",
        &[("retry-after", "0.05")],
        "",
    )])
    .await;

    let client = test_client(&test_config());
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/probe"))).await;

    assert_eq!(outcome.status, Some(429));
    assert!(outcome.error.as_deref().unwrap().contains("budget"));
    assert_eq!(hits.load(Ordering::SeqCst), 3, "three attempts, then terminal");
}

#[tokio::test]
async fn not_found_is_terminal_and_never_retried() {
    let (addr, hits) = scripted_server(vec![http_response("404 Not Found", &[], "")]).await;

    let client = test_client(&test_config());
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/missing"))).await;

    assert!(outcome.is_absent());
    assert!(outcome.error.is_none(), "absent data is not an error");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn other_statuses_are_recorded_not_retried() {
    let (addr, hits) =
        scripted_server(vec![http_response("503 Service Unavailable", &[("server", "edge-7")], "")])
            .await;

    let client = test_client(&test_config());
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/probe"))).await;

    assert_eq!(outcome.status, Some(503));
    assert_eq!(outcome.header("server"), Some("edge-7"));
    assert!(outcome.error.is_none());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transport_failure_yields_terminal_outcome_not_panic() {
    // Bind then drop to get a port that refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = test_config();
    config.retry_delay = Duration::from_millis(50);
    let client = test_client(&config);
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/probe"))).await;

    assert_eq!(outcome.status, None);
    assert!(outcome.error.as_deref().unwrap().contains("retry budget exhausted"));
}

#[tokio::test]
async fn non_json_success_body_keeps_raw_sample() {
    let (addr, _hits) =
        scripted_server(vec![http_response("200 OK", &[], "<html>hello</html>")]).await;

    let client = test_client(&test_config());
    let outcome = client.request(&ProbeTarget::get(format!("http://{addr}/page"))).await;

    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.body, Some(json!({"_raw": "<html>hello</html>"})));
    assert_eq!(outcome.body_size, "<html>hello</html>".len());
}

#[tokio::test]
async fn request_many_returns_one_outcome_per_target() {
    let (addr, hits) = scripted_server(vec![http_response("200 OK", &[], "{\"ok\": true}")]).await;

    let client = test_client(&test_config());
    let targets: Vec<ProbeTarget> =
        (0..5).map(|i| ProbeTarget::get(format!("http://{addr}/item/{i}"))).collect();
    let outcomes = client.request_many(targets).await;

    assert_eq!(outcomes.len(), 5);
    assert!(outcomes.iter().all(|o| o.status == Some(200)));
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}
