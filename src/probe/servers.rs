use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::client::{ProbeClient, ProbeTarget};
use crate::config::ProbeConfig;
use crate::probe::{Enumerator, UnitResult};

const API_BASE: &str = "https://discord.com/api/v9";

const DISCOVERY_CATEGORIES: &[&str] = &[
    "gaming",
    "music",
    "education",
    "science",
    "technology",
    "anime",
    "entertainment",
    "community",
    "creative",
];

#[derive(Debug, Default, Deserialize)]
struct DiscoveryPage {
    #[serde(default)]
    guilds: Vec<DiscoveredGuild>,
}

#[derive(Debug, Deserialize)]
struct DiscoveredGuild {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    approximate_member_count: Option<u64>,
    approximate_presence_count: Option<u64>,
    #[serde(default)]
    features: Vec<String>,
    discovery_splash: Option<String>,
    preferred_locale: Option<String>,
    vanity_url_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnGuild {
    id: String,
    name: Option<String>,
    #[serde(default)]
    owner: bool,
    permissions: Option<String>,
    #[serde(default)]
    features: Vec<String>,
}

/// Community-instance surface. Without a credential this walks the public
/// discovery directory; with one it lists the account's own instances and
/// pulls each preview.
pub struct ServerEnumerator {
    client: ProbeClient,
    authenticated: bool,
    cancel: CancellationToken,
}

impl ServerEnumerator {
    pub fn new(config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self {
            client: ProbeClient::new(config, cancel.clone()),
            authenticated: config.authenticated(),
            cancel,
        }
    }

    async fn public_directory(&self, errors: &mut Vec<Value>) -> Vec<Value> {
        let mut found = Vec::new();
        for category in DISCOVERY_CATEGORIES {
            if self.cancel.is_cancelled() {
                break;
            }
            let url = format!("{API_BASE}/discovery/categories/{category}/guilds");
            let outcome = self.client.request(&ProbeTarget::get(url)).await;

            if let Some(error) = &outcome.error {
                errors.push(json!(format!("discovery category {category}: {error}")));
                continue;
            }
            let Some(body) = outcome.body else { continue };
            let page: DiscoveryPage = match serde_json::from_value(body) {
                Ok(p) => p,
                Err(e) => {
                    errors.push(json!(format!("discovery category {category}: {e}")));
                    continue;
                }
            };

            for guild in page.guilds {
                tracing::debug!(name = ?guild.name, category = *category, "found public instance");
                found.push(json!({
                    "id": guild.id,
                    "name": guild.name,
                    "description": guild.description,
                    "member_count": guild.approximate_member_count,
                    "online_count": guild.approximate_presence_count,
                    "features": guild.features,
                    "category": category,
                    "discovery_splash": guild.discovery_splash,
                    "preferred_locale": guild.preferred_locale,
                    "vanity_url_code": guild.vanity_url_code,
                }));
            }
        }
        found
    }

    async fn own_instances(&self, errors: &mut Vec<Value>) -> Vec<Value> {
        let outcome = self
            .client
            .request(&ProbeTarget::get(format!("{API_BASE}/users/@me/guilds")))
            .await;

        if !outcome.is_success() {
            errors.push(json!(format!(
                "guild listing failed: {}",
                outcome.error.as_deref().unwrap_or("unexpected status")
            )));
            return Vec::new();
        }
        let guilds: Vec<OwnGuild> = match outcome.body.map(serde_json::from_value).transpose() {
            Ok(Some(guilds)) => guilds,
            Ok(None) => Vec::new(),
            Err(e) => {
                errors.push(json!(format!("guild listing: {e}")));
                return Vec::new();
            }
        };

        let mut instances = Vec::new();
        for guild in guilds {
            if self.cancel.is_cancelled() {
                break;
            }
            let preview = self
                .client
                .request(&ProbeTarget::get(format!("{API_BASE}/guilds/{}/preview", guild.id)))
                .await;

            instances.push(json!({
                "id": guild.id,
                "name": guild.name,
                "owner": guild.owner,
                "permissions": guild.permissions,
                "features": guild.features,
                "preview": preview.body,
            }));
        }
        instances
    }
}

#[async_trait]
impl Enumerator for ServerEnumerator {
    fn name(&self) -> &'static str {
        "servers"
    }

    async fn enumerate(&self) -> anyhow::Result<UnitResult> {
        let mut errors = Vec::new();

        let mut results = UnitResult::new();
        if self.authenticated {
            tracing::info!("running authenticated instance enumeration");
            results.insert("servers".to_string(), Value::Array(self.own_instances(&mut errors).await));
        } else {
            tracing::info!("running unauthenticated instance enumeration");
            results.insert(
                "public_servers".to_string(),
                Value::Array(self.public_directory(&mut errors).await),
            );
        }
        results.insert("errors".to_string(), Value::Array(errors));
        Ok(results)
    }
}
