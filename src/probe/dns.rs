use std::net::SocketAddr;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use serde_json::{json, Map, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::probe::{Enumerator, UnitResult};

const TARGET_DOMAINS: &[&str] = &["discord.com", "discordapp.com", "discord.gg", "discord.media"];

const RECORD_TYPES: &[(&str, RecordType)] = &[
    ("A", RecordType::A),
    ("AAAA", RecordType::AAAA),
    ("MX", RecordType::MX),
    ("NS", RecordType::NS),
    ("TXT", RecordType::TXT),
    ("CNAME", RecordType::CNAME),
    ("SOA", RecordType::SOA),
];

const COMMON_SUBDOMAINS: &[&str] = &[
    "api", "cdn", "media", "gateway", "status", "support", "developer", "developers", "canary",
    "ptb", "staging",
];

/// DNS surface: record sweep, nameservers, mail-security records, a
/// best-effort zone-transfer attempt per nameserver, and a concurrent
/// common-subdomain sweep.
pub struct DnsEnumerator {
    cancel: CancellationToken,
}

impl DnsEnumerator {
    pub fn new(_config: &ProbeConfig, cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    async fn record_sweep(&self, resolver: &TokioAsyncResolver, domain: &str) -> Map<String, Value> {
        let mut records = Map::new();
        for (label, record_type) in RECORD_TYPES {
            match resolver.lookup(domain, *record_type).await {
                Ok(answers) => {
                    let values: Vec<String> = answers.iter().map(|r| r.to_string()).collect();
                    records.insert(label.to_string(), json!(values));
                }
                Err(e) => {
                    tracing::debug!(domain, record = *label, error = %e, "no records");
                }
            }
        }
        records
    }

    async fn security_records(
        &self,
        resolver: &TokioAsyncResolver,
        domain: &str,
    ) -> Map<String, Value> {
        let mut security = Map::new();

        match resolver.txt_lookup(domain).await {
            Ok(txt) => {
                let spf: Vec<String> = txt
                    .iter()
                    .map(|r| r.to_string())
                    .filter(|r| r.to_lowercase().contains("spf"))
                    .collect();
                security.insert("spf".to_string(), json!(spf));
            }
            Err(e) => tracing::debug!(domain, error = %e, "TXT lookup failed"),
        }

        match resolver.txt_lookup(format!("_dmarc.{domain}")).await {
            Ok(txt) => {
                let dmarc: Vec<String> = txt.iter().map(|r| r.to_string()).collect();
                security.insert("dmarc".to_string(), json!(dmarc));
            }
            Err(e) => tracing::debug!(domain, error = %e, "no DMARC record"),
        }

        security
    }

    /// AXFR against each nameserver directly over TCP. Production
    /// nameservers refuse this; a failure per nameserver is expected and
    /// never aborts the remaining ones.
    async fn zone_transfer(
        &self,
        resolver: &TokioAsyncResolver,
        domain: &str,
        nameservers: &[String],
    ) -> Option<Vec<String>> {
        for ns in nameservers {
            if self.cancel.is_cancelled() {
                break;
            }
            let ns_host = ns.trim_end_matches('.');
            let ip = match resolver.lookup_ip(ns_host).await {
                Ok(ips) => match ips.iter().next() {
                    Some(ip) => ip,
                    None => continue,
                },
                Err(e) => {
                    tracing::debug!(nameserver = ns_host, error = %e, "nameserver did not resolve");
                    continue;
                }
            };

            let mut config = ResolverConfig::new();
            config.add_name_server(NameServerConfig::new(SocketAddr::new(ip, 53), Protocol::Tcp));
            let direct = TokioAsyncResolver::tokio(config, ResolverOpts::default());

            match direct.lookup(domain, RecordType::AXFR).await {
                Ok(answers) => {
                    let names: Vec<String> = answers.iter().map(|r| r.to_string()).collect();
                    if !names.is_empty() {
                        tracing::warn!(domain, nameserver = ns_host, "zone transfer allowed");
                        return Some(names);
                    }
                }
                Err(e) => {
                    tracing::debug!(domain, nameserver = ns_host, error = %e, "zone transfer refused");
                }
            }
        }
        None
    }

    async fn subdomain_sweep(&self, resolver: &TokioAsyncResolver, domain: &str) -> Vec<Value> {
        let mut tasks = JoinSet::new();
        for prefix in COMMON_SUBDOMAINS {
            let full = format!("{prefix}.{domain}");
            let resolver = resolver.clone();
            tasks.spawn(async move {
                match resolver.lookup_ip(full.as_str()).await {
                    Ok(ips) => {
                        let addrs: Vec<String> = ips.iter().map(|ip| ip.to_string()).collect();
                        if addrs.is_empty() {
                            None
                        } else {
                            Some(json!({ "subdomain": full, "ip": addrs }))
                        }
                    }
                    Err(_) => None,
                }
            });
        }

        let mut found = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some(entry)) = joined {
                found.push(entry);
            }
        }
        found
    }
}

#[async_trait]
impl Enumerator for DnsEnumerator {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn enumerate(&self) -> anyhow::Result<UnitResult> {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        let mut dns_records = Map::new();
        let mut nameservers = Map::new();
        let mut subdomains = Map::new();

        for domain in TARGET_DOMAINS {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut domain_entry = Map::new();
            domain_entry.insert(
                "records".to_string(),
                Value::Object(self.record_sweep(&resolver, domain).await),
            );
            domain_entry.insert(
                "security".to_string(),
                Value::Object(self.security_records(&resolver, domain).await),
            );

            let ns_names: Vec<String> = match resolver.ns_lookup(*domain).await {
                Ok(ns) => ns.iter().map(|r| r.to_string()).collect(),
                Err(e) => {
                    tracing::warn!(domain = *domain, error = %e, "nameserver lookup failed");
                    Vec::new()
                }
            };
            if !ns_names.is_empty() {
                nameservers.insert(domain.to_string(), json!(ns_names));
            }

            if let Some(names) = self.zone_transfer(&resolver, domain, &ns_names).await {
                domain_entry.insert("zone_transfer".to_string(), json!(names));
            }

            subdomains.insert(
                domain.to_string(),
                Value::Array(self.subdomain_sweep(&resolver, domain).await),
            );
            dns_records.insert(domain.to_string(), Value::Object(domain_entry));
        }

        let mut results = UnitResult::new();
        results.insert("dns_records".to_string(), Value::Object(dns_records));
        results.insert("nameservers".to_string(), Value::Object(nameservers));
        results.insert("subdomains".to_string(), Value::Object(subdomains));
        Ok(results)
    }
}
