pub mod asn;
pub mod cdn;
pub mod dns;
pub mod servers;
pub mod services;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;

/// Interpreted findings of one unit: category name -> findings, plus an
/// optional `error` key when the unit degraded to partial data.
pub type UnitResult = Map<String, Value>;

/// One independent category of reconnaissance. Implementations own their
/// connection pool and resolver for the duration of one `enumerate` call;
/// dropping the unit releases them on every exit path.
///
/// Implementations degrade to partial results on internal errors. An `Err`
/// here means the whole unit produced nothing usable, and the orchestrator
/// records it as that unit's `error` entry without touching its siblings.
#[async_trait]
pub trait Enumerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn enumerate(&self) -> anyhow::Result<UnitResult>;
}

/// The closed unit registry, in the order units are reported.
pub const MODULES: &[&str] = &["asn", "dns", "services", "cdn", "servers"];

/// Construct a unit by registry name. `None` for unknown names; the
/// orchestrator turns that into an invalid-module error before any unit runs.
pub fn build(
    name: &str,
    config: &ProbeConfig,
    cancel: CancellationToken,
) -> Option<Box<dyn Enumerator>> {
    match name {
        "asn" => Some(Box::new(asn::AsnEnumerator::new(config, cancel))),
        "dns" => Some(Box::new(dns::DnsEnumerator::new(config, cancel))),
        "services" => Some(Box::new(services::ServicesEnumerator::new(config, cancel))),
        "cdn" => Some(Box::new(cdn::CdnFuzzer::new(config, cancel))),
        "servers" => Some(Box::new(servers::ServerEnumerator::new(config, cancel))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builds_every_module() {
        let config = ProbeConfig::default();
        for name in MODULES {
            let unit = build(name, &config, CancellationToken::new());
            assert_eq!(unit.expect("registered module must build").name(), *name);
        }
    }

    #[test]
    fn unknown_module_does_not_build() {
        assert!(build("gateway", &ProbeConfig::default(), CancellationToken::new()).is_none());
    }
}
