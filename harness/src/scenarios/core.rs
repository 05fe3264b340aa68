//! Core Scenarios
//!
//! A single node coming up, and a primary/secondary pair surviving a
//! manual failover.

use anyhow::ensure;
use shared::NodeState;
use std::path::Path;

use crate::config::{DataNodeOptions, MonitorOptions};
use crate::node::{DataNode, MonitorNode};
use crate::runtime::Cluster;

pub(crate) const MONITOR_PORT: u16 = 5500;

pub(crate) async fn start_monitor(cluster: &mut Cluster, options: MonitorOptions) -> anyhow::Result<MonitorNode> {
    let monitor = cluster.create_monitor(options).await?;
    monitor.run().await?;
    ensure!(
        monitor.wait_until_pg_is_running(cluster.config().state_change_timeout()).await?,
        "monitor postgres did not start"
    );
    Ok(monitor)
}

pub(crate) async fn start_datanode(cluster: &mut Cluster, options: DataNodeOptions) -> anyhow::Result<DataNode> {
    let node = cluster.create_datanode(options).await?;
    node.create(true, "-v").await?;
    Ok(node)
}

/// Monitor plus one data node reaching `single`
pub async fn basic(cluster: &mut Cluster, workdir: &Path) -> anyhow::Result<()> {
    tracing::info!("🧪 Basic: monitor + single node");

    start_monitor(cluster, MonitorOptions::new(workdir.join("monitor")).port(MONITOR_PORT)).await?;
    let node1 = start_datanode(cluster, DataNodeOptions::new(workdir.join("node1")).port(MONITOR_PORT + 1)).await?;

    node1.wait_until_state(NodeState::Single).await?;
    ensure!(node1.pg_is_running().await?, "node1 postgres is not running");

    let uri = node1.show_uri(false).await?;
    tracing::info!("node1 uri:\n{}", uri);
    let role = node1.config_get("pg_autoctl.role").await?;
    ensure!(role == "keeper", "unexpected pg_autoctl.role '{}'", role);

    tracing::info!("✅ Basic: PASSED");
    Ok(())
}

/// Primary/secondary pair, maintenance round trip and manual failover
pub async fn failover(cluster: &mut Cluster, workdir: &Path) -> anyhow::Result<()> {
    tracing::info!("🧪 Failover: primary + secondary");

    let monitor = start_monitor(cluster, MonitorOptions::new(workdir.join("monitor")).port(MONITOR_PORT)).await?;

    let node1 = start_datanode(cluster, DataNodeOptions::new(workdir.join("node1")).port(MONITOR_PORT + 1)).await?;
    node1.wait_until_state(NodeState::Single).await?;

    let node2 = start_datanode(cluster, DataNodeOptions::new(workdir.join("node2")).port(MONITOR_PORT + 2)).await?;
    node2.wait_until_state(NodeState::Secondary).await?;
    node1.wait_until_state(NodeState::Primary).await?;

    ensure!(node1.has_needed_replication_slots().await?, "node1 is missing replication slots");
    ensure!(node2.has_needed_replication_slots().await?, "node2 is missing replication slots");
    ensure!(node1.get_replication_quorum().await?, "replication quorum should default to true");

    ensure!(node2.set_candidate_priority(60).await?, "candidate priority was rejected");
    ensure!(node2.get_candidate_priority().await? == 60, "candidate priority was not applied");
    ensure!(!node2.set_candidate_priority(101).await?, "out of range candidate priority was accepted");

    node2.enable_maintenance().await?;
    node2.wait_until_state(NodeState::Maintenance).await?;
    node2.disable_maintenance().await?;
    node2.wait_until_state(NodeState::Secondary).await?;

    monitor.failover("default", 0).await?;
    node2.wait_until_state(NodeState::Primary).await?;
    node1.wait_until_state(NodeState::Secondary).await?;

    monitor.print_state().await?;
    tracing::info!("monitor events:\n{}", monitor.get_events_str().await?);

    tracing::info!("✅ Failover: PASSED");
    Ok(())
}
