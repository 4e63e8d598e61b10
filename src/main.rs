//! lintegral CLI entry point

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lintegral::config::cli::{Cli, ExecutionMode};
use lintegral::config::{CoordinatorConfig, IntegrationParameters, WorkerConfig};
use lintegral::coordinator::{input, Coordinator};
use lintegral::worker::Worker;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    init_tracing()?;

    info!("lintegral v{}", env!("CARGO_PKG_VERSION"));
    info!("distributed integration of 1/ln(x)");

    match cli.mode {
        ExecutionMode::Coordinator => run_coordinator(cli),
        ExecutionMode::Worker => run_worker(cli),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// Run in coordinator mode: gather parameters, accept workers, drive the run.
fn run_coordinator(cli: Cli) -> Result<()> {
    let config = build_coordinator_config(&cli)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    let final_result = runtime.block_on(async {
        let coordinator = Coordinator::bind(&config).await?;
        let start = input::spawn_start_listener();
        coordinator.run(start).await
    })?;

    info!(
        "integration of [{}, {}] finished: {:.15}",
        config.parameters.lower_limit, config.parameters.upper_limit, final_result
    );
    Ok(())
}

/// Run in worker mode: connect to the coordinator and compute one share.
fn run_worker(cli: Cli) -> Result<()> {
    let config = build_worker_config(&cli)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    runtime.block_on(async {
        let worker = Worker::new(
            config.server_addr.clone(),
            config.method.build(),
            config.threads,
        )?;
        worker.run().await
    })?;

    info!("worker finished");
    Ok(())
}

/// Builds the coordinator configuration, prompting for any integration
/// parameter not supplied on the command line.
fn build_coordinator_config(cli: &Cli) -> Result<CoordinatorConfig> {
    let lower_limit = match cli.lower {
        Some(value) => value,
        None => input::prompt_f64("Enter a lower integration limit")?,
    };
    let upper_limit = match cli.upper {
        Some(value) => value,
        None => input::prompt_f64("Enter an upper integration limit")?,
    };
    let step = match cli.step {
        Some(value) => value,
        None => input::prompt_f64("Enter integration step size")?,
    };

    Ok(CoordinatorConfig {
        port: cli.port,
        parameters: IntegrationParameters {
            lower_limit,
            upper_limit,
            step,
        },
        collect_timeout: Duration::from_secs(cli.collect_timeout),
    })
}

fn build_worker_config(cli: &Cli) -> Result<WorkerConfig> {
    let host = cli
        .host
        .as_ref()
        .context("worker mode requires the coordinator HOST argument")?;

    Ok(WorkerConfig {
        server_addr: format!("{}:{}", host, cli.port),
        method: cli.method,
        threads: cli.threads,
    })
}
