use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

use crate::config::ProbeConfig;

/// Browser identity sent on every request. A bare library user agent gets
/// served different CDN behavior than a real browser, so the full Chrome
/// header set is used.
fn default_headers(token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Accept", HeaderValue::from_static("*/*"));
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));
    headers.insert(
        "Sec-Ch-Ua",
        HeaderValue::from_static("\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"121\", \"Chromium\";v=\"121\""),
    );
    headers.insert("Sec-Ch-Ua-Mobile", HeaderValue::from_static("?0"));
    headers.insert("Sec-Ch-Ua-Platform", HeaderValue::from_static("\"Windows\""));
    headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
    headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
    headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
    if let Some(token) = token {
        match HeaderValue::from_str(token) {
            Ok(mut v) => {
                v.set_sensitive(true);
                headers.insert(AUTHORIZATION, v);
            }
            Err(_) => tracing::warn!("credential contains invalid header bytes, ignoring"),
        }
    }
    headers
}

/// Build the pooled client one probing unit owns for its lifetime.
/// Connections are reused aggressively within the unit and released when the
/// unit is dropped.
pub fn build_client(config: &ProbeConfig) -> Client {
    ClientBuilder::new()
        .default_headers(default_headers(config.token.as_deref()))
        .pool_max_idle_per_host(config.workers.max(10))
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)
        .timeout(config.timeout)
        .connect_timeout(Duration::from_secs(5))
        .gzip(true)
        .brotli(true)
        .use_rustls_tls()
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36")
        .build()
        .expect("failed to build HTTP client")
}
