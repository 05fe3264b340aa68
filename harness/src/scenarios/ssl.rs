//! TLS Scenarios

use anyhow::ensure;
use shared::{NodeState, SslMode};
use std::path::Path;

use super::core::{start_datanode, start_monitor, MONITOR_PORT};
use crate::config::{DataNodeOptions, MonitorOptions, TlsOptions};
use crate::runtime::Cluster;

/// Self-signed certificates everywhere, connections require TLS
pub async fn self_signed(cluster: &mut Cluster, workdir: &Path) -> anyhow::Result<()> {
    tracing::info!("🧪 SSL: self-signed certificates");

    let tls = TlsOptions::self_signed().with_ssl_mode(SslMode::Require);

    let monitor = start_monitor(
        cluster,
        MonitorOptions::new(workdir.join("monitor"))
            .port(MONITOR_PORT)
            .tls(tls.clone()),
    )
    .await?;
    ensure!(monitor.pg_config_get("ssl").await? == "on", "monitor ssl is off");
    ensure!(
        monitor.config_get("ssl.sslmode").await? == SslMode::Require.as_str(),
        "monitor sslmode was not recorded"
    );

    let node1 = start_datanode(
        cluster,
        DataNodeOptions::new(workdir.join("node1"))
            .port(MONITOR_PORT + 1)
            .tls(tls.clone()),
    )
    .await?;
    node1.wait_until_state(NodeState::Single).await?;

    let node2 = start_datanode(
        cluster,
        DataNodeOptions::new(workdir.join("node2"))
            .port(MONITOR_PORT + 2)
            .tls(tls),
    )
    .await?;
    node2.wait_until_state(NodeState::Secondary).await?;
    node1.wait_until_state(NodeState::Primary).await?;

    for node in [&node1, &node2] {
        ensure!(node.pg_config_get("ssl").await? == "on", "{} ssl is off", node.id());
        ensure!(
            node.pg_config_get("ssl_cert_file").await?.ends_with("server.crt"),
            "{} does not use the self-signed certificate",
            node.id()
        );
    }

    tracing::info!("✅ SSL: PASSED");
    Ok(())
}
