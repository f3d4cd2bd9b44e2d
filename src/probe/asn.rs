use std::collections::BTreeSet;

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::client::{ProbeClient, ProbeTarget};
use crate::config::ProbeConfig;
use crate::probe::{Enumerator, UnitResult};

const TARGET_DOMAINS: &[&str] = &[
    "discord.com",
    "discordapp.com",
    "discord.gg",
    "cdn.discordapp.com",
    "media.discordapp.net",
];

#[derive(Debug, Deserialize)]
struct BgpViewIpResponse {
    #[serde(default)]
    data: BgpViewIpData,
}

#[derive(Debug, Default, Deserialize)]
struct BgpViewIpData {
    #[serde(default)]
    prefixes: Vec<BgpViewPrefix>,
}

#[derive(Debug, Deserialize)]
struct BgpViewPrefix {
    prefix: String,
    asn: Option<BgpViewAsn>,
}

#[derive(Debug, Deserialize)]
struct BgpViewAsn {
    asn: u32,
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AsnPrefixesResponse {
    #[serde(default)]
    data: AsnPrefixesData,
}

#[derive(Debug, Default, Deserialize)]
struct AsnPrefixesData {
    #[serde(default)]
    ipv4_prefixes: Vec<PrefixEntry>,
    #[serde(default)]
    ipv6_prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct RdapNetwork {
    handle: Option<String>,
    name: Option<String>,
    #[serde(rename = "startAddress")]
    start_address: Option<String>,
    #[serde(rename = "endAddress")]
    end_address: Option<String>,
}

/// IP allocation surface: resolve each front-door domain, look up the
/// announcing ASN and registered network (RDAP), and collect the announced
/// prefixes per ASN.
pub struct AsnEnumerator {
    client: ProbeClient,
    cancel: CancellationToken,
}

impl AsnEnumerator {
    pub fn new(config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self { client: ProbeClient::new(config, cancel.clone()), cancel }
    }

    async fn bgp_lookup(&self, ip: &str) -> Option<BgpViewPrefix> {
        let outcome = self
            .client
            .request(&ProbeTarget::get(format!("https://api.bgpview.io/ip/{ip}")))
            .await;
        let body = outcome.body?;
        let parsed: BgpViewIpResponse = match serde_json::from_value(body) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(ip, error = %e, "unexpected BGP response shape");
                return None;
            }
        };
        parsed.data.prefixes.into_iter().find(|p| p.asn.is_some())
    }

    async fn rdap_lookup(&self, ip: &str) -> Option<RdapNetwork> {
        let outcome = self
            .client
            .request(&ProbeTarget::get(format!("https://rdap.org/ip/{ip}")))
            .await;
        serde_json::from_value(outcome.body?).ok()
    }

    async fn asn_prefixes(&self, asn: u32) -> Vec<String> {
        let outcome = self
            .client
            .request(&ProbeTarget::get(format!("https://api.bgpview.io/asn/{asn}/prefixes")))
            .await;
        let Some(body) = outcome.body else { return Vec::new() };
        let parsed: AsnPrefixesResponse = match serde_json::from_value(body) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(asn, error = %e, "unexpected prefix response shape");
                return Vec::new();
            }
        };
        parsed
            .data
            .ipv4_prefixes
            .into_iter()
            .chain(parsed.data.ipv6_prefixes)
            .map(|p| p.prefix)
            .collect()
    }
}

#[async_trait]
impl Enumerator for AsnEnumerator {
    fn name(&self) -> &'static str {
        "asn"
    }

    async fn enumerate(&self) -> anyhow::Result<UnitResult> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        let mut asn_info = Vec::new();
        let mut ip_ranges = BTreeSet::new();
        let mut organization_info = Map::new();
        let mut rdap_networks = Map::new();
        let mut seen_asns = BTreeSet::new();

        for domain in TARGET_DOMAINS {
            if self.cancel.is_cancelled() {
                break;
            }

            let ip = match resolver.lookup_ip(*domain).await {
                Ok(ips) => match ips.iter().next() {
                    Some(ip) => ip.to_string(),
                    None => continue,
                },
                Err(e) => {
                    tracing::warn!(domain = *domain, error = %e, "resolution failed");
                    continue;
                }
            };

            let Some(prefix) = self.bgp_lookup(&ip).await else {
                tracing::warn!(domain = *domain, ip = %ip, "no ASN data");
                continue;
            };
            let asn = prefix.asn.as_ref().map(|a| a.asn);

            asn_info.push(json!({
                "domain": domain,
                "ip_address": ip,
                "asn": asn,
                "asn_description": prefix.asn.as_ref().and_then(|a| a.description.clone()),
                "network": prefix.prefix,
            }));
            ip_ranges.insert(prefix.prefix.clone());

            if let Some(bgp_asn) = &prefix.asn {
                if let Some(name) = &bgp_asn.name {
                    organization_info.insert(bgp_asn.asn.to_string(), json!(name));
                }
                if seen_asns.insert(bgp_asn.asn) {
                    for announced in self.asn_prefixes(bgp_asn.asn).await {
                        ip_ranges.insert(announced);
                    }
                }
            }

            if let Some(network) = self.rdap_lookup(&ip).await {
                rdap_networks.insert(
                    domain.to_string(),
                    json!({
                        "handle": network.handle,
                        "name": network.name,
                        "start_address": network.start_address,
                        "end_address": network.end_address,
                    }),
                );
            }
        }

        let mut results = UnitResult::new();
        results.insert("asn_info".to_string(), Value::Array(asn_info));
        results.insert("ip_ranges".to_string(), json!(ip_ranges.into_iter().collect::<Vec<_>>()));
        results.insert("organization_info".to_string(), Value::Object(organization_info));
        results.insert("rdap_networks".to_string(), Value::Object(rdap_networks));
        Ok(results)
    }
}
