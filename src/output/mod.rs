use std::path::Path;

use crate::orchestrator::Report;
use crate::utils::ensure_dir;

/// Write the aggregate report as pretty-printed JSON. Collections inside
/// the report are plain arrays and objects, so the artifact is directly
/// diffable between runs.
pub fn save_report(path: &Path, report: &Report) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let rendered = serde_json::to_string_pretty(report)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::orchestrator::Orchestrator;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn report_round_trips_as_json() {
        let orchestrator =
            Orchestrator::new(ProbeConfig::default(), "unauth", CancellationToken::new());
        let report = orchestrator.run_units(Vec::new(), None).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");
        save_report(&path, &report).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["metadata"]["mode"], "unauth");
        assert!(parsed["results"].as_object().unwrap().is_empty());
    }
}
