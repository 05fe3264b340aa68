//! Data nodes

use async_trait::async_trait;
use shared::{exit_code, member_info, NodeState};
use std::collections::BTreeSet;
use std::ops::Deref;

use super::command::AutoCtlCommand;
use super::member::ClusterMember;
use super::monitor::{last_events, MonitorEvent, MonitorNode};
use super::pg_node::first_value;
use super::sql::SqlValue;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::poller::{ConvergencePoller, StateProbe};

const REPORTED_STATE_QUERY: &str = "\
SELECT reportedstate::text \
  FROM pgautofailover.node \
 WHERE nodeid = $1 AND groupid = $2";

const REPLICATION_SLOTS_QUERY: &str = "\
SELECT slot_name::text \
  FROM pg_replication_slots \
 WHERE slot_name ~ '^pgautofailover_standby_' \
   AND slot_type = 'physical'";

#[derive(Clone)]
pub struct DataNode {
    member: ClusterMember,
    monitor: MonitorNode,
    node_id: u32,
    group: u32,
    listen: bool,
    formation: Option<String>,
}

impl Deref for DataNode {
    type Target = ClusterMember;

    fn deref(&self) -> &ClusterMember {
        &self.member
    }
}

impl DataNode {
    pub(crate) fn new(
        member: ClusterMember,
        monitor: MonitorNode,
        node_id: u32,
        group: u32,
        listen: bool,
        formation: Option<String>,
    ) -> Self {
        Self {
            member,
            monitor,
            node_id,
            group,
            listen,
            formation,
        }
    }

    pub fn member(&self) -> &ClusterMember {
        &self.member
    }

    pub fn monitor(&self) -> &MonitorNode {
        &self.monitor
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    /// Host handed to `pg_autoctl create --pghost`
    ///
    /// The socket directory wins over the listen address, which wins over
    /// the configured default host.
    pub fn pghost(&self) -> String {
        let config = self.config();
        if let Some(dir) = &config.socket_dir {
            return dir.display().to_string();
        }
        if self.listen {
            return self.address().to_string();
        }
        config.pghost.clone()
    }

    fn create_command(&self, level: &str, run: bool) -> HarnessResult<AutoCtlCommand> {
        let mut command = AutoCtlCommand::new(["create", self.role().command(), level])
            .args(["--pghost".to_string(), self.pghost()])
            .args(["--pgport".to_string(), self.port().to_string()])
            .args(["--pgctl".to_string(), self.config().pg_ctl.display().to_string()])
            .args(["--auth", self.auth_method()])
            .args(["--monitor".to_string(), self.monitor.connection_string()?])
            .args(self.tls().create_args());

        if self.listen {
            command = command.args(["--listen".to_string(), self.address().to_string()]);
        }
        if let Some(formation) = &self.formation {
            command = command.args(["--formation", formation.as_str()]);
        }
        if run {
            command = command.arg("--run");
        }
        Ok(command)
    }

    /// `pg_autoctl create <role>`
    ///
    /// With `run` the command keeps running as the node's background process.
    pub async fn create(&self, run: bool, level: &str) -> HarnessResult<()> {
        let command = self.create_command(level, run)?;
        if run {
            return self.start_background(&command).await;
        }
        self.execute("pg_autoctl create", command).await?;
        Ok(())
    }

    /// `pg_autoctl run -vv` in the background
    pub async fn run(&self) -> HarnessResult<()> {
        self.member.run("-vv").await
    }

    pub async fn destroy(&self) -> HarnessResult<()> {
        self.teardown(AutoCtlCommand::new(["drop", "node", "--destroy"]))
            .await
    }

    /// Poll the monitor until this node reports `target`
    ///
    /// Uses the configured interval and state change timeout.
    pub async fn wait_until_state(&self, target: NodeState) -> HarnessResult<()> {
        let config = self.config();
        let poller = ConvergencePoller::new(config.poll_interval(), config.state_change_timeout());
        self.wait_until_state_with(&poller, target).await
    }

    pub async fn wait_until_state_with(&self, poller: &ConvergencePoller, target: NodeState) -> HarnessResult<()> {
        poller.wait_until_state(self.context(), self, &target).await
    }

    /// State this node last reported to the monitor
    pub async fn get_state(&self) -> HarnessResult<NodeState> {
        let rows = self
            .monitor
            .run_sql_query(
                REPORTED_STATE_QUERY,
                &[SqlValue::from(self.node_id), SqlValue::from(self.group)],
            )
            .await?;

        first_value(rows)
            .map(|value| NodeState::from(value.to_text().as_str()))
            .ok_or(HarnessError::NodeNotFound {
                node_id: self.node_id,
                group_id: self.group,
            })
    }

    pub async fn get_events(&self) -> HarnessResult<Vec<MonitorEvent>> {
        last_events(self.monitor.core()).await
    }

    pub async fn enable_maintenance(&self) -> HarnessResult<()> {
        self.execute("enable maintenance", AutoCtlCommand::new(["enable", "maintenance"]))
            .await?;
        Ok(())
    }

    pub async fn disable_maintenance(&self) -> HarnessResult<()> {
        self.execute_with_timeout(
            "disable maintenance",
            AutoCtlCommand::new(["disable", "maintenance"]),
            std::time::Duration::from_secs(10),
        )
        .await?;
        Ok(())
    }

    /// Remove this node from its formation
    pub async fn drop(&self) -> HarnessResult<()> {
        self.execute("drop node", AutoCtlCommand::new(["drop", "node"]))
            .await?;
        Ok(())
    }

    /// Returns `false` when `pg_autoctl` rejects the value
    pub async fn set_candidate_priority(&self, priority: i32) -> HarnessResult<bool> {
        let command = AutoCtlCommand::new(["set", "node", "candidate-priority"]).passthrough([priority.to_string()]);
        self.execute_flag("set candidate priority", command, &[exit_code::BAD_ARGS])
            .await
    }

    pub async fn get_candidate_priority(&self) -> HarnessResult<i32> {
        let output = self
            .execute(
                "get candidate priority",
                AutoCtlCommand::new(["get", "node", "candidate-priority"]),
            )
            .await?;
        parse_int("candidate priority", &output.stdout)
    }

    /// Returns `false` when `pg_autoctl` rejects the value
    pub async fn set_replication_quorum(&self, quorum: bool) -> HarnessResult<bool> {
        let command = AutoCtlCommand::new(["set", "node", "replication-quorum"]).arg(quorum.to_string());
        self.execute_flag("set replication quorum", command, &[exit_code::BAD_ARGS])
            .await
    }

    /// Accepts exactly `true` or `false`
    pub async fn get_replication_quorum(&self) -> HarnessResult<bool> {
        let output = self
            .execute(
                "get replication quorum",
                AutoCtlCommand::new(["get", "node", "replication-quorum"]),
            )
            .await?;
        parse_strict_bool("replication quorum", &output.stdout)
    }

    /// Returns `false` when rejected by argument parsing or by the monitor
    pub async fn set_number_sync_standbys(&self, count: i32) -> HarnessResult<bool> {
        let command = AutoCtlCommand::new(["set", "formation", "number-sync-standbys"]).arg(count.to_string());
        self.execute_flag(
            "set number sync standbys",
            command,
            &[exit_code::BAD_ARGS, exit_code::MONITOR],
        )
        .await
    }

    pub async fn get_number_sync_standbys(&self) -> HarnessResult<i32> {
        let output = self
            .execute(
                "get number sync standbys",
                AutoCtlCommand::new(["get", "formation", "number-sync-standbys"]),
            )
            .await?;
        parse_int("number sync standbys", &output.stdout)
    }

    pub async fn get_synchronous_standby_names(&self) -> HarnessResult<String> {
        let output = self
            .execute(
                "show synchronous_standby_names",
                AutoCtlCommand::new(["show", "synchronous_standby_names"]),
            )
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Physical `pgautofailover_standby_*` slots on the local Postgres
    pub async fn list_replication_slot_names(&self) -> HarnessResult<Vec<String>> {
        let rows = self.run_sql_query(REPLICATION_SLOTS_QUERY, &[]).await?;
        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|value| value.to_text())
            .collect())
    }

    /// Whether there is exactly one slot per other node of the group
    ///
    /// Postgres 10 cannot advance slots on standbys, so it keeps none and
    /// always passes.
    pub async fn has_needed_replication_slots(&self) -> HarnessResult<bool> {
        let major = self.pg_major().await?;
        if major == 10 {
            return Ok(true);
        }

        let host = self.address().to_string();
        let expected: BTreeSet<String> = self
            .monitor
            .get_other_nodes(&host, self.port())
            .await?
            .iter()
            .map(|node| format!("pgautofailover_standby_{}", node.node_id))
            .collect();
        let current: BTreeSet<String> = self.list_replication_slot_names().await?.into_iter().collect();

        if expected == current {
            member_info!(self.id(), "slots are {:?}, as expected", current);
        } else {
            member_info!(self.id(), "slots are {:?}, expected {:?}", current, expected);
        }
        Ok(expected == current)
    }
}

#[async_trait]
impl StateProbe for DataNode {
    fn label(&self) -> String {
        self.id().to_string()
    }

    async fn current_state(&self) -> HarnessResult<NodeState> {
        self.get_state().await
    }

    async fn dump_diagnostics(&self) {
        self.print_debug_logs().await;
    }
}

fn parse_int(what: &str, raw: &str) -> HarnessResult<i32> {
    raw.trim()
        .parse()
        .map_err(|_| HarnessError::unexpected(what, raw.trim()))
}

fn parse_strict_bool(what: &str, raw: &str) -> HarnessResult<bool> {
    match raw.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(HarnessError::unexpected(what, other)),
    }
}
