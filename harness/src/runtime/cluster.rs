//! Cluster
//!
//! Owns the members (at most one monitor plus data nodes in creation order)
//! and the network they run on, and tears everything down again.

use shared::logging::log_error;
use shared::{member_info, MemberId, Role};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::context::ClusterContext;
use super::process::{CapturedOutput, ManagedProcess};
use crate::config::{DataNodeOptions, HarnessConfig, MonitorOptions};
use crate::error::{HarnessError, HarnessResult};
use crate::network::{CommandLine, HostNetwork, VirtualNetwork};
use crate::node::monitor::{MONITOR_DATABASE, MONITOR_USER};
use crate::node::pg_node::NodeParams;
use crate::node::{ClusterMember, DataNode, MonitorNode, PgNode};

/// Database data nodes are connected to
const DATANODE_DATABASE: &str = "postgres";

pub struct Cluster {
    config: Arc<HarnessConfig>,
    ctx: Arc<ClusterContext>,
    network: Box<dyn VirtualNetwork>,
    monitor: Option<MonitorNode>,
    datanodes: Vec<DataNode>,
}

impl Cluster {
    pub fn new(config: HarnessConfig, network: Box<dyn VirtualNetwork>) -> Self {
        let config = Arc::new(config);
        Self {
            ctx: Arc::new(ClusterContext::new(config.clone())),
            config,
            network,
            monitor: None,
            datanodes: Vec::new(),
        }
    }

    /// Cluster whose nodes all run on the local host
    pub fn with_host_network(config: HarnessConfig) -> Self {
        let network = HostNetwork::new(config.network_base);
        Self::new(config, Box::new(network))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.ctx
    }

    /// Create the monitor and run `pg_autoctl create monitor`
    ///
    /// The monitor is registered before the create command runs so that a
    /// failed create is still cleaned up by `destroy`.
    pub async fn create_monitor(&mut self, options: MonitorOptions) -> HarnessResult<MonitorNode> {
        if self.monitor.is_some() {
            return Err(HarnessError::AlreadyExists {
                what: "monitor".to_string(),
            });
        }

        let vnode = self.network.create_node()?;
        let core = Arc::new(PgNode::new(NodeParams {
            id: MemberId::Monitor,
            role: Role::Monitor,
            vnode,
            config: self.config.clone(),
            datadir: options.datadir,
            port: options.port,
            username: MONITOR_USER.to_string(),
            database: MONITOR_DATABASE.to_string(),
            auth_method: options.auth_method,
            tls: options.tls,
        }));
        self.ctx.register_monitor(core.clone()).await?;

        let monitor = MonitorNode::new(ClusterMember::new(core, self.ctx.clone()), options.nodename);
        self.monitor = Some(monitor.clone());
        member_info!(MemberId::Monitor, "🏗️ creating monitor at {}", monitor.datadir().display());

        monitor.create(false).await?;
        Ok(monitor)
    }

    /// Register a new data node
    ///
    /// Node ids are assigned from 1 in creation order. The caller runs
    /// `DataNode::create`.
    pub async fn create_datanode(&mut self, options: DataNodeOptions) -> HarnessResult<DataNode> {
        let monitor = self.monitor.clone().ok_or_else(|| HarnessError::MonitorMissing {
            what: "a data node".to_string(),
        })?;

        let node_id = u32::try_from(self.datanodes.len() + 1)
            .map_err(|_| HarnessError::unexpected("node id", self.datanodes.len().to_string()))?;
        let id = MemberId::DataNode(node_id);

        let vnode = self.network.create_node()?;
        let core = Arc::new(PgNode::new(NodeParams {
            id,
            role: options.role,
            vnode,
            config: self.config.clone(),
            datadir: options.datadir,
            port: options.port,
            username: self.config.username.clone(),
            database: DATANODE_DATABASE.to_string(),
            auth_method: options.auth_method,
            tls: options.tls,
        }));
        self.ctx.register_datanode(core.clone()).await;

        let datanode = DataNode::new(
            ClusterMember::new(core, self.ctx.clone()),
            monitor,
            node_id,
            options.group,
            options.listen,
            options.formation,
        );
        self.datanodes.push(datanode.clone());
        member_info!(id, "🏗️ registered {} node at {}", options.role, datanode.datadir().display());
        Ok(datanode)
    }

    /// Create a plain Postgres cluster with `pg_createcluster`
    ///
    /// Returns the data directory under `/var/lib/postgresql/<version>/`.
    pub async fn pg_createcluster(&self, datadir: &str, port: u16) -> HarnessResult<PathBuf> {
        let vnode = self.network.create_node()?;
        let config = &self.config;

        let create = CommandLine::new("sudo")
            .args(["pg_createcluster", "-U", config.username.as_str(), config.pg_version.as_str(), datadir])
            .args(["-p".to_string(), port.to_string()])
            .envs(config.child_env());
        info!("{}", create);
        vnode.run_and_wait(&create, "pg_createcluster").await?;

        let root = PathBuf::from("/var/lib/postgresql").join(&config.pg_version);
        let backup = root.join("backup");
        let install = CommandLine::new("sudo")
            .args(["install", "-d", "-o", config.username.as_str()])
            .arg(backup.display().to_string())
            .envs(config.child_env());
        info!("{}", install);
        vnode.run_and_wait(&install, "chmod").await?;

        Ok(root.join(datadir))
    }

    pub fn monitor(&self) -> Option<&MonitorNode> {
        self.monitor.as_ref()
    }

    pub fn datanodes(&self) -> &[DataNode] {
        &self.datanodes
    }

    /// Every member, data nodes first and the monitor last
    pub fn nodes(&self) -> Vec<ClusterMember> {
        self.datanodes
            .iter()
            .map(|node| node.member().clone())
            .chain(self.monitor.iter().map(|monitor| monitor.member().clone()))
            .collect()
    }

    pub async fn flush_all(&self) {
        self.ctx.flush_all().await;
    }

    pub async fn sleep(&self, duration: Duration) {
        self.ctx.sleep(duration).await;
    }

    pub async fn communicate(&self, process: &mut ManagedProcess, timeout: Duration) -> HarnessResult<CapturedOutput> {
        self.ctx.communicate(process, timeout).await
    }

    /// Destroy data nodes, then the monitor, then the network
    ///
    /// Keeps going after a failure and returns the first one.
    pub async fn destroy(&mut self) -> HarnessResult<()> {
        let mut first_error = None;

        for node in std::mem::take(&mut self.datanodes) {
            if let Err(err) = node.destroy().await {
                log_error(&node.id(), "destroy", &err);
                first_error = first_error.or(Some(err));
            }
        }

        if let Some(monitor) = self.monitor.take() {
            if let Err(err) = monitor.destroy().await {
                log_error(&MemberId::Monitor, "destroy", &err);
                first_error = first_error.or(Some(err));
            }
        }

        self.ctx.clear().await;

        if let Err(err) = self.network.destroy().await {
            first_error = first_error.or(Some(err));
        }

        first_error.map_or(Ok(()), Err)
    }
}
