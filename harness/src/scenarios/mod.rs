//! Cluster Scenarios
//!
//! End-to-end runs against real `pg_autoctl` binaries. Each scenario works
//! in its own subdirectory of the work directory.

pub mod core;
pub mod ssl;

use std::path::Path;

use crate::runtime::Cluster;

/// Scenario names accepted by [`run_scenario`]
pub fn available_scenarios() -> &'static [&'static str] {
    &["basic", "failover", "ssl", "all"]
}

/// Run a specific scenario by name
pub async fn run_scenario(name: &str, cluster: &mut Cluster, workdir: &Path) -> anyhow::Result<()> {
    match name {
        "basic" => core::basic(cluster, &workdir.join("basic")).await,
        "failover" => core::failover(cluster, &workdir.join("failover")).await,
        "ssl" => ssl::self_signed(cluster, &workdir.join("ssl")).await,

        // Every scenario, each on a fresh cluster
        "all" => {
            tracing::info!("🧪 Running all scenarios");
            let config = cluster.config().clone();

            core::basic(cluster, &workdir.join("basic")).await?;
            cluster.destroy().await?;

            let mut next = Cluster::with_host_network(config.clone());
            let result = core::failover(&mut next, &workdir.join("failover")).await;
            next.destroy().await?;
            result?;

            let mut next = Cluster::with_host_network(config);
            let result = ssl::self_signed(&mut next, &workdir.join("ssl")).await;
            next.destroy().await?;
            result
        }

        _ => anyhow::bail!(
            "Unknown scenario '{}'. Available: {}",
            name,
            available_scenarios().join(", ")
        ),
    }
}
