//! Nightly reconciliation sweeper.
//!
//! ```text
//! recordcache-sweeper [--once] [--config <path>]
//! ```
//!
//! Without `--once` the sweep runs on the configured cron schedule until
//! Ctrl-C. Log output is JSON when `RECORDCACHE_LOG_JSON` is truthy.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use recordcache_core::{CacheBackend, ReconciliationSweeper, RecordStore};
use recordcache_domain::Config;
use recordcache_infra::scheduling::{SweepScheduler, SweepSchedulerConfig};
use recordcache_infra::{config, logging, HttpRecordStore, RedisCacheBackend};
use tracing::{error, info};

#[derive(Debug, Default)]
struct Args {
    once: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    let mut raw = std::env::args().skip(1);

    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--once" => args.once = true,
            "--config" => {
                let path = raw.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Ok(None),
            unknown => bail!("unknown argument: {unknown}"),
        }
    }
    Ok(Some(args))
}

fn print_help() {
    println!("recordcache-sweeper: evict cached records the store no longer has");
    println!();
    println!("USAGE:");
    println!("    recordcache-sweeper [--once] [--config <path>]");
    println!();
    println!("OPTIONS:");
    println!("    --once           Run a single sweep and exit");
    println!("    --config <path>  Load configuration from this JSON or TOML file");
    println!("    -h, --help       Show this help message");
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => config::load_from_file(Some(path.clone()))?,
        None => config::load()?,
    };
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args).context("loading configuration")?;

    let backend = Arc::new(
        RedisCacheBackend::open(&config.backend).await.context("connecting to cache backend")?,
    );
    let store: Arc<dyn RecordStore> =
        Arc::new(HttpRecordStore::new(&config.store).context("building record store client")?);
    let sweeper = ReconciliationSweeper::new(
        Arc::clone(&backend) as Arc<dyn CacheBackend>,
        store,
        &config.cache,
    )
    .context("building sweeper")?;

    let result = if args.once {
        sweep_once(&sweeper).await
    } else if !config.sweep.enabled {
        info!("Sweep is disabled in configuration, nothing to schedule");
        Ok(())
    } else {
        schedule(sweeper, SweepSchedulerConfig::from(&config.sweep)).await
    };

    backend.close().await;
    result
}

async fn sweep_once(sweeper: &ReconciliationSweeper) -> anyhow::Result<()> {
    let report = sweeper.run().await.context("sweep aborted")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn schedule(sweeper: ReconciliationSweeper, config: SweepSchedulerConfig) -> anyhow::Result<()> {
    let mut scheduler = SweepScheduler::with_config(config, Arc::new(sweeper)).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutdown requested");

    scheduler.stop().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let json_logs = std::env::var("RECORDCACHE_LOG_JSON")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    logging::init("info", json_logs);

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{e}");
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "recordcache-sweeper failed");
            ExitCode::FAILURE
        }
    }
}
