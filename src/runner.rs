use std::path::PathBuf;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use infra_hunter::config::ProbeConfig;
use infra_hunter::orchestrator::Orchestrator;
use infra_hunter::output::save_report;
use infra_hunter::probe;

fn print_ascii_logo() {
    println!(r#"
    ___ _  _ ___ ___    _     _  _ _   _ _  _ _____ ___ ___
   |_ _| \| | __| _ \  /_\   | || | | | | \| |_   _| __| _ \
    | || .` | _||   / / _ \  | __ | |_| | .` | | | | _||   /
   |___|_|\_|_| |_|_\/_/ \_\ |_||_|\___/|_|\_| |_| |___|_|_\

                Infrastructure Surface Enumerator
    "#);
}

pub async fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    // Configure logging based on global flags. Keep external crates
    // (reqwest/hyper/resolver) at INFO to avoid flooding the CLI.
    use tracing_subscriber::EnvFilter;
    let crate_level = if cli.debug { "debug" } else if cli.verbose { "info" } else { "warn" };
    let filter_str = format!(
        "infra_hunter={crate_level},reqwest=info,hyper=info,h2=info,hickory_resolver=info"
    );
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .init();

    let config = ProbeConfig {
        token: cli.token.clone(),
        request_delay: Duration::from_millis(cli.delay_ms),
        retry_delay: Duration::from_secs(1),
        retries: cli.retries.clamp(1, 10),
        timeout: Duration::from_secs(cli.timeout),
        workers: cli.workers.max(1),
    };

    print_ascii_logo();
    println!("[*] Configuration:");
    println!("    Mode: {}", cli.mode);
    println!("    Module: {}", cli.module);
    println!("    Workers: {}", config.workers);
    println!("    Request delay: {}ms", cli.delay_ms);
    println!();

    tracing::info!(
        mode = %cli.mode,
        module = %cli.module,
        workers = config.workers,
        delay_ms = cli.delay_ms,
        retries = config.retries,
        "starting enumeration"
    );

    // First ctrl-c stops issuing new requests and lets the partial report
    // drain; in-flight units are aborted.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n[!] Enumeration interrupted by user");
            signal_cancel.cancel();
        }
    });

    let module_count = if cli.module == "all" { probe::MODULES.len() } else { 1 };
    let bar = ProgressBar::new(module_count as u64);
    bar.set_style(
        ProgressStyle::with_template("[{bar:30}] {pos}/{len} modules")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let orchestrator = Orchestrator::new(config, cli.mode.clone(), cancel.clone());

    let start = Instant::now();
    let mut report = if cli.module == "all" {
        orchestrator.run_all(Some(bar.clone())).await
    } else {
        orchestrator.run_one(&cli.module, Some(bar.clone())).await?
    };
    bar.finish_and_clear();

    let total = start.elapsed().as_secs_f64();
    report.metadata.total_execution_time = Some(total);

    let out_path = PathBuf::from(&cli.output);
    save_report(&out_path, &report)?;
    println!("[+] Results saved to {}", out_path.display());
    println!("[+] Total execution time: {total:.2}s");

    if cancel.is_cancelled() {
        anyhow::bail!("enumeration interrupted");
    }
    Ok(())
}
