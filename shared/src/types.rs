//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Exit codes used by `pg_autoctl`
pub mod exit_code {
    pub const QUIT: i32 = 0;
    pub const BAD_ARGS: i32 = 1;
    pub const BAD_CONFIG: i32 = 2;
    pub const BAD_STATE: i32 = 3;
    pub const PGSQL: i32 = 4;
    pub const PGCTL: i32 = 5;
    pub const MONITOR: i32 = 6;
}

/// Role a node plays in the cluster, as passed to `pg_autoctl create <role>`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Monitor,
    Postgres,
    Coordinator,
    Worker,
}

impl Role {
    /// Command-line token for this role
    pub const fn command(&self) -> &'static str {
        match self {
            Role::Monitor => "monitor",
            Role::Postgres => "postgres",
            Role::Coordinator => "coordinator",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Role {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitor" => Ok(Role::Monitor),
            "postgres" => Ok(Role::Postgres),
            "coordinator" => Ok(Role::Coordinator),
            "worker" => Ok(Role::Worker),
            _ => Err(SharedError::UnknownRole { value: s.to_string() }),
        }
    }
}

/// Formation-level feature toggled with `pg_autoctl enable|disable <feature>`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Secondary,
}

impl Feature {
    pub const fn command(&self) -> &'static str {
        match self {
            Feature::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

impl FromStr for Feature {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secondary" => Ok(Feature::Secondary),
            _ => Err(SharedError::UnknownFeature { value: s.to_string() }),
        }
    }
}

/// libpq `sslmode` values
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            _ => Err(SharedError::InvalidSslMode { value: s.to_string() }),
        }
    }
}

/// State a data node reports to the monitor
///
/// States the harness does not know about are kept verbatim in `Other` so
/// that polling never fails just because the monitor grew a new state.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Init,
    Single,
    WaitPrimary,
    Primary,
    Draining,
    DemoteTimeout,
    Demoted,
    CatchingUp,
    Secondary,
    PreparePromotion,
    StopReplication,
    WaitStandby,
    Maintenance,
    JoinPrimary,
    ApplySettings,
    PrepareMaintenance,
    WaitMaintenance,
    ReportLsn,
    FastForward,
    JoinSecondary,
    Dropped,
    Other(String),
}

impl NodeState {
    pub fn as_str(&self) -> &str {
        match self {
            NodeState::Init => "init",
            NodeState::Single => "single",
            NodeState::WaitPrimary => "wait_primary",
            NodeState::Primary => "primary",
            NodeState::Draining => "draining",
            NodeState::DemoteTimeout => "demote_timeout",
            NodeState::Demoted => "demoted",
            NodeState::CatchingUp => "catchingup",
            NodeState::Secondary => "secondary",
            NodeState::PreparePromotion => "prepare_promotion",
            NodeState::StopReplication => "stop_replication",
            NodeState::WaitStandby => "wait_standby",
            NodeState::Maintenance => "maintenance",
            NodeState::JoinPrimary => "join_primary",
            NodeState::ApplySettings => "apply_settings",
            NodeState::PrepareMaintenance => "prepare_maintenance",
            NodeState::WaitMaintenance => "wait_maintenance",
            NodeState::ReportLsn => "report_lsn",
            NodeState::FastForward => "fast_forward",
            NodeState::JoinSecondary => "join_secondary",
            NodeState::Dropped => "dropped",
            NodeState::Other(state) => state,
        }
    }
}

impl From<&str> for NodeState {
    fn from(s: &str) -> Self {
        match s.trim() {
            "init" => NodeState::Init,
            "single" => NodeState::Single,
            "wait_primary" => NodeState::WaitPrimary,
            "primary" => NodeState::Primary,
            "draining" => NodeState::Draining,
            "demote_timeout" => NodeState::DemoteTimeout,
            "demoted" => NodeState::Demoted,
            "catchingup" => NodeState::CatchingUp,
            "secondary" => NodeState::Secondary,
            "prepare_promotion" => NodeState::PreparePromotion,
            "stop_replication" => NodeState::StopReplication,
            "wait_standby" => NodeState::WaitStandby,
            "maintenance" => NodeState::Maintenance,
            "join_primary" => NodeState::JoinPrimary,
            "apply_settings" => NodeState::ApplySettings,
            "prepare_maintenance" => NodeState::PrepareMaintenance,
            "wait_maintenance" => NodeState::WaitMaintenance,
            "report_lsn" => NodeState::ReportLsn,
            "fast_forward" => NodeState::FastForward,
            "join_secondary" => NodeState::JoinSecondary,
            "dropped" => NodeState::Dropped,
            other => NodeState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cluster member, used as the `member` field in logs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberId {
    /// Data node, numbered from 1 in creation order
    DataNode(u32),
    Monitor,
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberId::DataNode(id) => write!(f, "node{id}"),
            MemberId::Monitor => write!(f, "monitor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_command_tokens() {
        assert_eq!(Role::Monitor.command(), "monitor");
        assert_eq!(Role::Postgres.command(), "postgres");
        assert_eq!(Role::Coordinator.to_string(), "coordinator");
        assert_eq!("worker".parse::<Role>().unwrap(), Role::Worker);
        assert!("Monitor".parse::<Role>().is_err());
    }

    #[test]
    fn test_feature_command_token() {
        assert_eq!(Feature::Secondary.command(), "secondary");
        assert_eq!(
            "primary".parse::<Feature>(),
            Err(SharedError::UnknownFeature { value: "primary".to_string() })
        );
    }

    #[test]
    fn test_ssl_mode_strings() {
        assert_eq!(SslMode::VerifyCa.as_str(), "verify-ca");
        assert_eq!("require".parse::<SslMode>().unwrap(), SslMode::Require);
        assert!("required".parse::<SslMode>().is_err());

        let parsed: SslMode = serde_json::from_str("\"verify-full\"").unwrap();
        assert_eq!(parsed, SslMode::VerifyFull);
    }

    #[test]
    fn test_node_state_parsing() {
        assert_eq!(NodeState::from("single"), NodeState::Single);
        assert_eq!(NodeState::from("wait_primary\n"), NodeState::WaitPrimary);
        assert_eq!(NodeState::from("catchingup").as_str(), "catchingup");

        let unknown = NodeState::from("wait_cascade");
        assert_eq!(unknown, NodeState::Other("wait_cascade".to_string()));
        assert_eq!(unknown.to_string(), "wait_cascade");
    }

    #[test]
    fn test_monitor_sorts_after_data_nodes() {
        let mut ids = vec![MemberId::Monitor, MemberId::DataNode(2), MemberId::DataNode(1)];
        ids.sort();
        assert_eq!(ids, vec![MemberId::DataNode(1), MemberId::DataNode(2), MemberId::Monitor]);
        assert_eq!(MemberId::DataNode(3).to_string(), "node3");
    }
}
