//! Cluster Members
//!
//! The monitor and data nodes, the `pg_autoctl` command builder and the SQL
//! value type used to talk to Postgres.

pub mod command;
pub mod datanode;
pub mod member;
pub mod monitor;
pub mod pg_node;
pub mod sql;

// Re-export main types
pub use command::AutoCtlCommand;
pub use datanode::DataNode;
pub use member::ClusterMember;
pub use monitor::{MonitorEvent, MonitorNode, OtherNode};
pub use pg_node::PgNode;
pub use sql::{SqlRow, SqlValue};
