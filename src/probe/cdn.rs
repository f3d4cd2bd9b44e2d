use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::client::{ProbeClient, ProbeTarget};
use crate::config::ProbeConfig;
use crate::fuzz::{discloses_cache_info, is_interesting, PathGenerator};
use crate::probe::{Enumerator, UnitResult};

const CDN_DOMAINS: &[&str] = &["cdn.discordapp.com", "media.discordapp.net", "images.discordapp.net"];

const CDN_ENDPOINTS: &[&str] =
    &["attachments", "avatars", "icons", "banners", "splashes", "emojis", "stickers"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Candidate path templates for the fuzz sweep. Together with the pools
/// above and FUZZ_ID_COUNT this expands to a few thousand candidates; keep
/// the product in that range when touching any pool.
const FUZZ_PATTERNS: &[&str] = &[
    "{id}",
    "{id}.{ext}",
    "{id}/original",
    "{id}?size=1024",
    "{id}?width=100&height=100",
    "{endpoint}/{id}",
    "avatars/{id}/{id}",
];

const FUZZ_ID_COUNT: usize = 5;

const METADATA_SIZES: &[&str] = &["16", "32", "64", "128", "256", "512", "1024", "2048", "4096"];
const METADATA_FORMATS: &[&str] = &["png", "jpg", "webp", "gif"];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Object-storage surface: endpoint sanity probes, combinatorial path
/// fuzzing with cache-disclosure classification, and the resize/transcode
/// metadata grid.
pub struct CdnFuzzer {
    client: ProbeClient,
    cancel: CancellationToken,
}

impl CdnFuzzer {
    pub fn new(config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self { client: ProbeClient::new(config, cancel.clone()), cancel }
    }

    /// Malformed-path probes per endpoint: canonical id, traversal, null
    /// byte, oversized segment.
    async fn endpoint_probes(&self, domain: &str) -> Map<String, Value> {
        let long_segment = "A".repeat(1000);
        let mut endpoint_results = Map::new();

        for endpoint in CDN_ENDPOINTS {
            if self.cancel.is_cancelled() {
                break;
            }
            let paths = [
                format!("https://{domain}/{endpoint}/123456789"),
                format!("https://{domain}/{endpoint}/../../etc/passwd"),
                format!("https://{domain}/{endpoint}/%00test"),
                format!("https://{domain}/{endpoint}/{long_segment}"),
            ];
            let targets = paths.iter().map(|path| ProbeTarget::get(path.as_str())).collect();
            let outcomes = self.client.request_many(targets).await;

            let mut entries = Vec::new();
            for outcome in &outcomes {
                if is_interesting(outcome) {
                    tracing::info!(url = %outcome.url, status = ?outcome.status, "unexpected endpoint response");
                }
                entries.push(json!({
                    "path": outcome.url,
                    "status": outcome.status,
                    "headers": outcome.headers_json(),
                    "size": outcome.body_size,
                }));
            }
            endpoint_results.insert(endpoint.to_string(), Value::Array(entries));
        }
        endpoint_results
    }

    async fn fuzz_paths(&self) -> (Vec<Value>, Vec<Value>) {
        let generator = PathGenerator::new(
            strings(CDN_DOMAINS),
            strings(FUZZ_PATTERNS),
            strings(CDN_ENDPOINTS),
            FUZZ_ID_COUNT,
            strings(IMAGE_EXTENSIONS),
        );
        tracing::debug!(candidates = generator.len(), "starting CDN fuzz sweep");

        let outcomes = self.client.request_many(generator.candidates().collect()).await;

        let mut interesting = Vec::new();
        let mut vulnerable = Vec::new();
        for outcome in &outcomes {
            if is_interesting(outcome) {
                interesting.push(json!({
                    "url": outcome.url,
                    "status": outcome.status,
                    "headers": outcome.headers_json(),
                }));
            }
            if discloses_cache_info(outcome) {
                vulnerable.push(json!({
                    "url": outcome.url,
                    "type": "information_disclosure",
                    "headers": outcome.headers_json(),
                }));
            }
        }
        (interesting, vulnerable)
    }

    /// Resize/format query matrix against a fixed synthetic object.
    async fn metadata_grid(&self, domain: &str) -> Map<String, Value> {
        let mut pairs = Vec::new();
        for size in METADATA_SIZES {
            for format in METADATA_FORMATS {
                pairs.push((
                    format!("{size}_{format}"),
                    format!("https://{domain}/avatars/123456789/test.{format}?size={size}"),
                ));
            }
        }

        let targets = pairs.iter().map(|(_, url)| ProbeTarget::head(url.clone())).collect();
        let outcomes = self.client.request_many(targets).await;
        let mut grid = Map::new();
        for (label, url) in pairs {
            if let Some(outcome) = outcomes.iter().find(|o| o.url == url) {
                grid.insert(
                    label,
                    json!({ "status": outcome.status, "headers": outcome.headers_json() }),
                );
            }
        }
        grid
    }
}

#[async_trait]
impl Enumerator for CdnFuzzer {
    fn name(&self) -> &'static str {
        "cdn"
    }

    async fn enumerate(&self) -> anyhow::Result<UnitResult> {
        let mut cdn_endpoints = Map::new();
        for domain in CDN_DOMAINS {
            if self.cancel.is_cancelled() {
                break;
            }
            cdn_endpoints
                .insert(domain.to_string(), Value::Object(self.endpoint_probes(domain).await));
        }

        let (interesting, vulnerable) = self.fuzz_paths().await;

        let mut metadata = Map::new();
        for domain in CDN_DOMAINS {
            if self.cancel.is_cancelled() {
                break;
            }
            metadata.insert(domain.to_string(), Value::Object(self.metadata_grid(domain).await));
        }

        let mut results = UnitResult::new();
        results.insert("cdn_endpoints".to_string(), Value::Object(cdn_endpoints));
        results.insert("interesting_findings".to_string(), Value::Array(interesting));
        results.insert("vulnerable_patterns".to_string(), Value::Array(vulnerable));
        results.insert("metadata".to_string(), Value::Object(metadata));
        Ok(results)
    }
}
