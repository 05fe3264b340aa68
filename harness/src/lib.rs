//! pg_auto_failover Cluster Harness
//!
//! Drives real `pg_autoctl` processes through cluster scenarios: a monitor,
//! data nodes created against it, and polling of the states each node
//! reports until the cluster converges.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harness::*;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = HarnessConfig::from_env();
//! let mut cluster = Cluster::with_host_network(config);
//!
//! cluster.create_monitor(MonitorOptions::new("/tmp/demo/monitor")).await?;
//! let node1 = cluster
//!     .create_datanode(DataNodeOptions::new("/tmp/demo/node1").port(5501))
//!     .await?;
//! node1.create(true, "-v").await?;
//! node1.wait_until_state(NodeState::Single).await?;
//!
//! cluster.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod runtime;
pub mod scenarios;

pub use config::{DataNodeOptions, HarnessConfig, MonitorOptions, TlsOptions};
pub use error::{HarnessError, HarnessResult};
pub use network::{CommandLine, HostNetwork, NodeHandle, VirtualNetwork};
pub use node::{AutoCtlCommand, ClusterMember, DataNode, MonitorNode, PgNode, SqlValue};
pub use runtime::{Cluster, ClusterContext, ConvergencePoller, ManagedProcess, TimeoutBudget};
pub use shared::{Feature, MemberId, NodeState, Role, SslMode};
