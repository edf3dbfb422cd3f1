use analyzer_core::{ErrorExt, RunConfig};
use pipeline::{RunCounts, RunSummary};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reddit_analyzer=info,pipeline=info,storage=info,llm_interface=info,reddit_client=info,analyzer_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    tracing::info!("Starting Reddit analyzer");

    let started = Instant::now();
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            e.log_error();
            let summary = RunSummary::fatal(
                format!("Invalid configuration: {}", e.failure_reason()),
                RunCounts::default(),
                started.elapsed(),
            );
            report(&summary)?;
            std::process::exit(1);
        }
    };

    if config.poll_interval_minutes == 0 {
        let summary = pipeline::run(&config).await;
        report(&summary)?;
        if summary.is_fatal() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let period = Duration::from_secs(config.poll_interval_minutes * 60);
    tracing::info!(
        "Polling r/{} every {} minutes",
        config.subreddit,
        config.poll_interval_minutes
    );
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let summary = pipeline::run(&config).await;
                report(&summary)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested, stopping");
                return Ok(());
            }
        }
    }
}

/// Reads the configuration from the TOML file given as the first argument,
/// or from the environment.
fn load_config() -> Result<RunConfig, analyzer_core::ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            RunConfig::from_toml_file(path)
        }
        None => RunConfig::from_env(),
    }
}

fn report(summary: &RunSummary) -> anyhow::Result<()> {
    summary.log();
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
