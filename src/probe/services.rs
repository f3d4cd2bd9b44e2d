use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::client::{ProbeClient, ProbeTarget, RequestOutcome};
use crate::config::ProbeConfig;
use crate::probe::{Enumerator, UnitResult};

const API_BASE: &str = "https://discord.com/api/v9";

const ENDPOINTS: &[&str] = &[
    "/gateway",
    "/gateway/bot",
    "/voice/regions",
    "/applications/public",
    "/oauth2/applications/@me",
    "/users/@me",
    "/users/@me/guilds",
    "/users/@me/connections",
];

const SERVICES: &[(&str, &str)] = &[
    ("gateway", "https://gateway.discord.gg"),
    ("cdn", "https://cdn.discordapp.com"),
    ("media", "https://media.discordapp.net"),
    ("status", "https://status.discord.com"),
    ("support", "https://support.discord.com"),
    ("developer", "https://discord.com/developers"),
    ("application", "https://discord.com/api/applications"),
];

const AUTH_ENDPOINTS: &[&str] = &["/users/@me", "/users/@me/guilds", "/users/@me/connections"];

/// REST surface: public service availability, API endpoint census with JSON
/// capture, rate-limit header tracking, and (with a credential) the
/// account-scoped endpoints.
pub struct ServicesEnumerator {
    client: ProbeClient,
    authenticated: bool,
    cancel: CancellationToken,
}

impl ServicesEnumerator {
    pub fn new(config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self {
            client: ProbeClient::new(config, cancel.clone()),
            authenticated: config.authenticated(),
            cancel,
        }
    }

    fn outcome_entry(outcome: &RequestOutcome) -> Value {
        match outcome.status {
            Some(status) => json!({
                "status": status,
                "headers": outcome.headers_json(),
                "url": outcome.url,
            }),
            None => json!({
                "status": "error",
                "error": outcome.error,
                "url": outcome.url,
            }),
        }
    }

    async fn service_sweep(&self) -> Map<String, Value> {
        let targets = SERVICES.iter().map(|(_, url)| ProbeTarget::get(*url)).collect();
        let outcomes = self.client.request_many(targets).await;

        // Outcomes arrive in completion order; match them back by URL.
        let by_url: HashMap<&str, &RequestOutcome> =
            outcomes.iter().map(|o| (o.url.as_str(), o)).collect();

        let mut status_map = Map::new();
        for (name, url) in SERVICES {
            if let Some(outcome) = by_url.get(*url) {
                status_map.insert(name.to_string(), Self::outcome_entry(outcome));
            }
        }
        status_map
    }

    async fn endpoint_sweep(&self) -> (Map<String, Value>, Map<String, Value>, Option<Value>, Option<Value>) {
        let mut api_endpoints = Map::new();
        let mut rate_limits = Map::new();
        let mut gateway_info = None;
        let mut voice_regions = None;

        for endpoint in ENDPOINTS {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self
                .client
                .request(&ProbeTarget::get(format!("{API_BASE}{endpoint}")))
                .await;

            let mut entry = match outcome.status {
                Some(status) => {
                    let mut entry = Map::new();
                    entry.insert("status".to_string(), json!(status));
                    entry.insert("headers".to_string(), outcome.headers_json());
                    entry
                }
                None => {
                    let mut entry = Map::new();
                    entry.insert("status".to_string(), json!("error"));
                    entry.insert("error".to_string(), json!(outcome.error));
                    entry
                }
            };

            if outcome.is_success() {
                if let Some(body) = &outcome.body {
                    entry.insert("data".to_string(), body.clone());
                    match *endpoint {
                        "/gateway" => gateway_info = Some(body.clone()),
                        "/voice/regions" => voice_regions = Some(body.clone()),
                        _ => {}
                    }
                }
            }

            if outcome.header("x-ratelimit-limit").is_some() {
                rate_limits.insert(
                    endpoint.to_string(),
                    json!({
                        "limit": outcome.header("x-ratelimit-limit"),
                        "remaining": outcome.header("x-ratelimit-remaining"),
                        "reset": outcome.header("x-ratelimit-reset"),
                    }),
                );
            }

            api_endpoints.insert(endpoint.to_string(), Value::Object(entry));
        }

        (api_endpoints, rate_limits, gateway_info, voice_regions)
    }

    /// Credentialed sweep. Only the bodies matter here; endpoints that
    /// reject the credential simply contribute nothing.
    async fn authenticated_sweep(&self) -> Map<String, Value> {
        let mut authed = Map::new();
        for endpoint in AUTH_ENDPOINTS {
            if self.cancel.is_cancelled() {
                break;
            }
            let outcome = self
                .client
                .request(&ProbeTarget::get(format!("{API_BASE}{endpoint}")))
                .await;
            if outcome.is_success() {
                if let Some(body) = outcome.body {
                    authed.insert(endpoint.to_string(), body);
                }
            }
        }
        authed
    }
}

#[async_trait]
impl Enumerator for ServicesEnumerator {
    fn name(&self) -> &'static str {
        "services"
    }

    async fn enumerate(&self) -> anyhow::Result<UnitResult> {
        let services_status = self.service_sweep().await;
        let (api_endpoints, rate_limits, gateway_info, voice_regions) = self.endpoint_sweep().await;

        let mut results = UnitResult::new();
        results.insert("services_status".to_string(), Value::Object(services_status));
        results.insert("api_endpoints".to_string(), Value::Object(api_endpoints));
        results.insert("gateway_info".to_string(), gateway_info.unwrap_or(Value::Null));
        results.insert("voice_regions".to_string(), voice_regions.unwrap_or(Value::Null));
        results.insert("rate_limits".to_string(), Value::Object(rate_limits));

        if self.authenticated {
            results.insert(
                "authenticated_endpoints".to_string(),
                Value::Object(self.authenticated_sweep().await),
            );
        }

        Ok(results)
    }
}
