use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::http_client::build_client;

/// A single request to issue: full URL plus method. Built once, consumed once.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub url: String,
    pub method: Method,
}

impl ProbeTarget {
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::GET }
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: Method::HEAD }
    }
}

/// Terminal result of one target's attempt chain. `status == None` marks a
/// transport-level failure; an absent body on a 2xx means the response was
/// empty or unreadable. Callers treat 404 as "no data", not as an error.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub url: String,
    pub status: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub body_size: usize,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }

    pub fn is_absent(&self) -> bool {
        self.status == Some(404)
    }

    /// Case-insensitive header lookup. reqwest lowercases names on receipt,
    /// but callers shouldn't have to know that.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers_json(&self) -> Value {
        json!(self.headers)
    }

    fn failed(url: &str, elapsed_ms: u64, error: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            status: None,
            headers: HashMap::new(),
            body: None,
            body_size: 0,
            elapsed_ms,
            error: Some(error.into()),
        }
    }
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
        .collect()
}

fn retry_after(headers: &HashMap<String, String>) -> Option<Duration> {
    let secs: f64 = headers.get("retry-after")?.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Rate-limited request layer every probing unit goes through. Each instance
/// owns its own connection pool; nothing is shared across units, so one
/// unit's exhausted budget or dropped pool cannot affect another.
#[derive(Clone)]
pub struct ProbeClient {
    http: reqwest::Client,
    request_delay: Duration,
    retry_delay: Duration,
    retries: u32,
    workers: usize,
    cancel: CancellationToken,
}

impl ProbeClient {
    pub fn new(config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self {
            http: build_client(config),
            request_delay: config.request_delay,
            retry_delay: config.retry_delay,
            retries: config.retries.max(1),
            workers: config.workers.max(1),
            cancel,
        }
    }

    /// Issue one request with retry/backoff. Always returns an outcome:
    /// retries exhausted, rate limiting, and transport failures all end as
    /// terminal outcomes carrying an `error` marker, never as an `Err`.
    ///
    /// 429 waits for the server's `Retry-After` (fallback: the configured
    /// retry delay); transport failures wait the fixed retry delay. Both
    /// draw from the same attempt budget. 404 is terminal "absent" data and
    /// never retried.
    pub async fn request(&self, target: &ProbeTarget) -> RequestOutcome {
        let mut last_error = String::from("no attempt made");
        for attempt in 1..=self.retries {
            if self.cancel.is_cancelled() {
                return RequestOutcome::failed(&target.url, 0, "cancelled");
            }

            let start = Instant::now();
            let sent = self.http.request(target.method.clone(), &target.url).send().await;
            match sent {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let headers = flatten_headers(resp.headers());
                    let elapsed_ms = start.elapsed().as_millis() as u64;

                    if status == 429 {
                        let wait = retry_after(&headers).unwrap_or(self.retry_delay);
                        tracing::warn!(url = %target.url, attempt, wait_s = wait.as_secs_f64(), "rate limited");
                        if attempt == self.retries {
                            return RequestOutcome {
                                url: target.url.clone(),
                                status: Some(429),
                                headers,
                                body: None,
                                body_size: 0,
                                elapsed_ms,
                                error: Some("retry budget exhausted while rate limited".to_string()),
                            };
                        }
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    return self.finish_response(target, status, headers, resp, start).await;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(url = %target.url, attempt, error = %last_error, "request failed");
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracing::error!(url = %target.url, retries = self.retries, "retry budget exhausted");
        RequestOutcome::failed(&target.url, 0, format!("retry budget exhausted: {last_error}"))
    }

    async fn finish_response(
        &self,
        target: &ProbeTarget,
        status: u16,
        headers: HashMap<String, String>,
        resp: reqwest::Response,
        start: Instant,
    ) -> RequestOutcome {
        let mut outcome = RequestOutcome {
            url: target.url.clone(),
            status: Some(status),
            headers,
            body: None,
            body_size: 0,
            elapsed_ms: 0,
            error: None,
        };

        match resp.bytes().await {
            Ok(bytes) => {
                outcome.body_size = bytes.len();
                if status == 200 && !bytes.is_empty() {
                    outcome.body = match serde_json::from_slice::<Value>(&bytes) {
                        Ok(v) => Some(v),
                        Err(_) => {
                            // Non-JSON bodies keep a short textual sample
                            // instead of failing the whole request.
                            let text = String::from_utf8_lossy(&bytes);
                            let sample: String = text.chars().take(200).collect();
                            Some(json!({ "_raw": sample }))
                        }
                    };
                }
            }
            Err(e) => {
                outcome.error = Some(format!("body read failed: {e}"));
            }
        }

        // 404 is absent data, not an error; anything else non-200 is
        // terminal data too, recorded as-is.
        if status != 200 && status != 404 {
            tracing::warn!(url = %target.url, status, "request returned non-success status");
        }

        outcome.elapsed_ms = start.elapsed().as_millis() as u64;
        outcome
    }

    /// Fan out over many targets with bounded concurrency. Each task sleeps
    /// the configured pacing delay before issuing its request; this bounds
    /// the request rate best-effort only (independent per-task sleeps, no
    /// shared limiter). One outcome per dispatched target, completion order.
    pub async fn request_many(&self, targets: Vec<ProbeTarget>) -> Vec<RequestOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut set = JoinSet::new();

        for target in targets {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("request semaphore closed");
            let client = self.clone();
            set.spawn(async move {
                tokio::time::sleep(client.request_delay).await;
                let outcome = client.request(&target).await;
                drop(permit);
                outcome
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(outcome) = joined {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let outcome = RequestOutcome {
            url: "https://example.com".into(),
            status: Some(200),
            headers: HashMap::from([("x-cache".to_string(), "HIT".to_string())]),
            body: None,
            body_size: 0,
            elapsed_ms: 1,
            error: None,
        };
        assert_eq!(outcome.header("X-Cache"), Some("HIT"));
        assert_eq!(outcome.header("x-served-by"), None);
    }

    #[test]
    fn retry_after_parses_seconds() {
        let headers = HashMap::from([("retry-after".to_string(), "2".to_string())]);
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(2)));

        let headers = HashMap::from([("retry-after".to_string(), "0.5".to_string())]);
        assert_eq!(retry_after(&headers), Some(Duration::from_millis(500)));

        let headers = HashMap::from([("retry-after".to_string(), "soon".to_string())]);
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn absent_is_not_an_error() {
        let outcome = RequestOutcome {
            url: "https://example.com/missing".into(),
            status: Some(404),
            headers: HashMap::new(),
            body: None,
            body_size: 0,
            elapsed_ms: 1,
            error: None,
        };
        assert!(outcome.is_absent());
        assert!(!outcome.is_success());
        assert!(outcome.error.is_none());
    }
}
