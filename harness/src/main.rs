//! Harness runner
//!
//! Runs one named scenario against real `pg_autoctl` binaries and tears the
//! cluster down afterwards, whatever the outcome.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;

use harness::scenarios::{available_scenarios, run_scenario};
use harness::{Cluster, HarnessConfig};
use shared::logging::{init_tracing_with_level, log_shutdown, log_startup};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "pg_auto_failover cluster test harness")]
struct Args {
    /// Scenario to run
    #[arg(long, default_value = "basic")]
    scenario: String,

    /// JSON configuration file; the environment is used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding every node's data directory
    #[arg(long, default_value = "/tmp/pgautofailover")]
    workdir: PathBuf,

    /// Overall scenario timeout in seconds
    #[arg(long, default_value = "900")]
    timeout_secs: u64,

    /// Keep the cluster running after the scenario (for debugging)
    #[arg(long)]
    keep_running: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// List scenario names and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    if args.list {
        for name in available_scenarios() {
            println!("{name}");
        }
        return Ok(());
    }

    init_tracing_with_level(args.verbose.then_some("debug"));

    let config = match &args.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            let config = HarnessConfig::from_env();
            config.validate()?;
            config
        }
    };

    log_startup(&format!("scenario '{}' in {}", args.scenario, args.workdir.display()));
    tracing::info!("Scenario: {}, Timeout: {}s", args.scenario, args.timeout_secs);

    let mut cluster = Cluster::with_host_network(config);
    let outcome = timeout(
        Duration::from_secs(args.timeout_secs),
        run_scenario(&args.scenario, &mut cluster, &args.workdir),
    )
    .await;

    let result = match outcome {
        Ok(Ok(())) => {
            tracing::info!("✅ Scenario '{}' completed successfully", args.scenario);

            if args.keep_running {
                tracing::info!("🔄 Keeping the cluster running (--keep-running flag set)");
                tracing::info!("Press Ctrl+C to destroy it");
                tokio::signal::ctrl_c().await?;
            }
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("❌ Scenario '{}' failed: {:#}", args.scenario, e);
            Err(e)
        }
        Err(_) => {
            tracing::error!(
                "⏰ Scenario '{}' timed out after {}s",
                args.scenario,
                args.timeout_secs
            );
            Err(anyhow::anyhow!("scenario timeout"))
        }
    };

    log_shutdown("destroying cluster");
    cluster.destroy().await.context("destroying cluster")?;

    tracing::info!("🏁 Harness run completed");
    result
}
