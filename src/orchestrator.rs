use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::bail;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::probe::{self, Enumerator};

#[derive(Debug, Serialize)]
pub struct RunMetadata {
    pub timestamp: String,
    pub mode: String,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Per-unit wall time, seconds.
    pub execution_time: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_execution_time: Option<f64>,
}

/// The aggregate of one run. `results` holds one entry per requested unit:
/// a failed unit contributes `{"error": msg}` under its name, an interrupted
/// one contributes nothing. Only the orchestrator writes here.
#[derive(Debug, Serialize)]
pub struct Report {
    pub metadata: RunMetadata,
    pub results: Map<String, Value>,
}

pub struct Orchestrator {
    config: ProbeConfig,
    mode: String,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: ProbeConfig, mode: impl Into<String>, cancel: CancellationToken) -> Self {
        Self { config, mode: mode.into(), cancel }
    }

    fn empty_report(&self) -> Report {
        Report {
            metadata: RunMetadata {
                timestamp: Utc::now().to_rfc3339(),
                mode: self.mode.clone(),
                authenticated: self.config.authenticated(),
                module: None,
                execution_time: BTreeMap::new(),
                total_execution_time: None,
            },
            results: Map::new(),
        }
    }

    /// Run every registered unit concurrently and merge whatever each
    /// produces. A unit failure becomes that unit's `error` entry and never
    /// cancels its siblings.
    pub async fn run_all(&self, progress: Option<ProgressBar>) -> Report {
        let units: Vec<Box<dyn Enumerator>> = probe::MODULES
            .iter()
            .filter_map(|name| probe::build(name, &self.config, self.cancel.clone()))
            .collect();
        self.run_units(units, progress).await
    }

    /// Run a single registered unit. Unknown names fail here, before any
    /// unit is constructed or any request issued.
    pub async fn run_one(&self, name: &str, progress: Option<ProgressBar>) -> anyhow::Result<Report> {
        let Some(unit) = probe::build(name, &self.config, self.cancel.clone()) else {
            bail!("invalid module: {name}");
        };
        let mut report = self.run_units(vec![unit], progress).await;
        report.metadata.module = Some(name.to_string());
        Ok(report)
    }

    /// Shared fan-out: one spawned task per unit, merged in completion
    /// order. Cancellation aborts the units still in flight; entries already
    /// merged are kept and an aborted unit leaves no partial entry.
    pub async fn run_units(
        &self,
        units: Vec<Box<dyn Enumerator>>,
        progress: Option<ProgressBar>,
    ) -> Report {
        let mut report = self.empty_report();

        let mut aborts = Vec::new();
        let mut pending = FuturesUnordered::new();
        for unit in units {
            let name = unit.name();
            tracing::info!(unit = name, "starting enumeration");
            let handle = tokio::spawn(async move {
                let start = Instant::now();
                let result = unit.enumerate().await;
                (start.elapsed().as_secs_f64(), result)
            });
            aborts.push(handle.abort_handle());
            pending.push(async move { (name, handle.await) });
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::warn!("run interrupted, aborting units still in flight");
                    for abort in &aborts {
                        abort.abort();
                    }
                    // Units that finished before the abort landed still get
                    // merged; aborted ones leave no entry.
                    while let Some((name, joined)) = pending.next().await {
                        Self::merge(&mut report, name, joined, progress.as_ref());
                    }
                    break;
                }
                next = pending.next() => {
                    let Some((name, joined)) = next else { break };
                    Self::merge(&mut report, name, joined, progress.as_ref());
                }
            }
        }

        report
    }

    fn merge(
        report: &mut Report,
        name: &'static str,
        joined: Result<(f64, anyhow::Result<probe::UnitResult>), tokio::task::JoinError>,
        progress: Option<&ProgressBar>,
    ) {
        match joined {
            Ok((elapsed, Ok(unit_result))) => {
                tracing::info!(unit = name, elapsed_s = elapsed, "enumeration completed");
                report.results.insert(name.to_string(), Value::Object(unit_result));
                report.metadata.execution_time.insert(name.to_string(), elapsed);
            }
            Ok((elapsed, Err(e))) => {
                tracing::error!(unit = name, error = %e, "enumeration failed");
                report.results.insert(name.to_string(), json!({ "error": e.to_string() }));
                report.metadata.execution_time.insert(name.to_string(), elapsed);
            }
            Err(join_error) if join_error.is_cancelled() => {
                tracing::debug!(unit = name, "unit aborted before completion");
                return;
            }
            Err(join_error) => {
                tracing::error!(unit = name, error = %join_error, "unit task failed");
                report.results.insert(name.to_string(), json!({ "error": join_error.to_string() }));
            }
        }
        if let Some(bar) = progress {
            bar.inc(1);
        }
    }
}
