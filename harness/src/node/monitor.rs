//! The monitor node

use shared::{member_info, Feature, Role};
use std::ops::Deref;

use super::command::AutoCtlCommand;
use super::member::ClusterMember;
use super::pg_node::PgNode;
use super::sql::SqlValue;
use crate::error::HarnessResult;

/// Monitor user every node connects as
pub const MONITOR_USER: &str = "autoctl_node";
/// Database holding the `pgautofailover` schema
pub const MONITOR_DATABASE: &str = "pg_auto_failover";

const LAST_EVENTS_QUERY: &str = "\
SELECT eventtime::text, nodeid, nodename, reportedstate::text, goalstate::text, \
       reportedrepstate::text, reportedlsn::text, description \
  FROM pgautofailover.last_events('default', count => 20)";

const OTHER_NODES_QUERY: &str = "\
SELECT node_id, node_name, node_port, node_lsn::text, node_is_primary \
  FROM pgautofailover.get_other_nodes($1::text, $2::int)";

/// A row of `pgautofailover.last_events`
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    pub eventtime: String,
    pub nodeid: i64,
    pub nodename: String,
    pub reported_state: String,
    pub goal_state: String,
    pub reported_repl_state: String,
    pub reported_lsn: String,
    pub description: String,
}

impl MonitorEvent {
    fn from_row(row: &[SqlValue]) -> Self {
        let text = |index: usize| row.get(index).map(SqlValue::to_text).unwrap_or_default();
        Self {
            eventtime: text(0),
            nodeid: row.get(1).and_then(SqlValue::as_i64).unwrap_or_default(),
            nodename: text(2),
            reported_state: text(3),
            goal_state: text(4),
            reported_repl_state: text(5),
            reported_lsn: text(6),
            description: text(7),
        }
    }

    fn table_line(&self) -> String {
        format!(
            "{} {:>2}:{:<14} {:>17}/{:<17} {:>7} {:>10} {}",
            self.eventtime,
            self.nodeid,
            self.nodename,
            self.reported_state,
            self.goal_state,
            self.reported_repl_state,
            self.reported_lsn,
            self.description
        )
    }
}

/// A row of `pgautofailover.get_other_nodes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherNode {
    pub node_id: i64,
    pub name: String,
    pub port: i64,
    pub lsn: String,
    pub is_primary: bool,
}

impl OtherNode {
    fn from_row(row: &[SqlValue]) -> Self {
        Self {
            node_id: row.first().and_then(SqlValue::as_i64).unwrap_or_default(),
            name: row.get(1).map(SqlValue::to_text).unwrap_or_default(),
            port: row.get(2).and_then(SqlValue::as_i64).unwrap_or_default(),
            lsn: row.get(3).map(SqlValue::to_text).unwrap_or_default(),
            is_primary: row.get(4).and_then(SqlValue::as_bool).unwrap_or(false),
        }
    }
}

/// Last 20 events of the default formation
pub async fn last_events(monitor: &PgNode) -> HarnessResult<Vec<MonitorEvent>> {
    let rows = monitor.run_sql_query(LAST_EVENTS_QUERY, &[]).await?;
    Ok(rows
        .unwrap_or_default()
        .iter()
        .map(|row| MonitorEvent::from_row(row))
        .collect())
}

/// Events rendered as a fixed-width table
pub async fn events_table(monitor: &PgNode) -> HarnessResult<String> {
    Ok(format_events(&last_events(monitor).await?))
}

fn format_events(events: &[MonitorEvent]) -> String {
    let header = format!(
        "{} {:>25}:{:<14} {:>17}/{:<17} {:>7} {:>10} {}",
        "eventtime", "id", "nodename", "state", "goal state", "repl st", "lsn", "event"
    );
    std::iter::once(header)
        .chain(events.iter().map(MonitorEvent::table_line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
pub struct MonitorNode {
    member: ClusterMember,
    nodename: String,
}

impl Deref for MonitorNode {
    type Target = ClusterMember;

    fn deref(&self) -> &ClusterMember {
        &self.member
    }
}

impl MonitorNode {
    pub(crate) fn new(member: ClusterMember, nodename: Option<String>) -> Self {
        let nodename = nodename.unwrap_or_else(|| member.address().to_string());
        Self { member, nodename }
    }

    pub fn member(&self) -> &ClusterMember {
        &self.member
    }

    pub fn nodename(&self) -> &str {
        &self.nodename
    }

    /// `pg_autoctl create monitor`, in the background when `run` is set
    pub async fn create(&self, run: bool) -> HarnessResult<()> {
        let mut command = AutoCtlCommand::new(["create", Role::Monitor.command(), "-vv"])
            .args(["--pgport".to_string(), self.port().to_string()])
            .args(["--auth", self.auth_method()])
            .args(["--nodename", self.nodename.as_str()])
            .args(self.tls().create_args());

        if run {
            command = command.arg("--run");
            return self.start_background(&command).await;
        }
        self.execute("create monitor", command).await?;
        Ok(())
    }

    /// `pg_autoctl run -v` in the background
    pub async fn run(&self) -> HarnessResult<()> {
        self.member.run("-v").await
    }

    pub async fn destroy(&self) -> HarnessResult<()> {
        self.teardown(AutoCtlCommand::new(["drop", "monitor", "--destroy"]))
            .await
    }

    /// `pg_autoctl create formation`
    ///
    /// `secondary` maps to `--enable-secondary`/`--disable-secondary` only
    /// when given.
    pub async fn create_formation(
        &self,
        name: &str,
        kind: &str,
        secondary: Option<bool>,
        dbname: Option<&str>,
    ) -> HarnessResult<()> {
        let mut command = AutoCtlCommand::new(["create", "formation", "--formation", name, "--kind", kind]);
        if let Some(dbname) = dbname {
            command = command.args(["--dbname", dbname]);
        }
        match secondary {
            Some(true) => command = command.arg("--enable-secondary"),
            Some(false) => command = command.arg("--disable-secondary"),
            None => {}
        }

        self.vnode()
            .run_and_wait(&self.autoctl(&command)?, "create formation")
            .await?;
        Ok(())
    }

    pub async fn enable(&self, feature: Feature, formation: &str) -> HarnessResult<()> {
        self.execute(
            &format!("enable {}", feature.command()),
            AutoCtlCommand::new(["enable", feature.command(), "--formation", formation]),
        )
        .await?;
        Ok(())
    }

    pub async fn disable(&self, feature: Feature, formation: &str) -> HarnessResult<()> {
        self.execute(
            &format!("disable {}", feature.command()),
            AutoCtlCommand::new(["disable", feature.command(), "--formation", formation]),
        )
        .await?;
        Ok(())
    }

    /// Manual failover through `pgautofailover.perform_failover`
    pub async fn failover(&self, formation: &str, group: u32) -> HarnessResult<()> {
        let sql = format!("select * from pgautofailover.perform_failover('{formation}', {group})");
        member_info!(self.id(), "🔀 manual failover of {}/{}", formation, group);
        self.vnode()
            .run_and_wait(&self.psql(&sql), "manual failover")
            .await?;
        Ok(())
    }

    /// Log `pg_autoctl show state`
    pub async fn print_state(&self) -> HarnessResult<String> {
        let output = self
            .execute("show state", AutoCtlCommand::new(["show", "state"]))
            .await?;
        member_info!(self.id(), "pg_autoctl show state\n{}", output.stdout);
        Ok(output.stdout)
    }

    /// Nodes in the same group as `host:port`, excluding it
    pub async fn get_other_nodes(&self, host: &str, port: u16) -> HarnessResult<Vec<OtherNode>> {
        let rows = self
            .run_sql_query(OTHER_NODES_QUERY, &[SqlValue::from(host), SqlValue::from(port)])
            .await?;
        Ok(rows
            .unwrap_or_default()
            .iter()
            .map(|row| OtherNode::from_row(row))
            .collect())
    }

    pub async fn get_events(&self) -> HarnessResult<Vec<MonitorEvent>> {
        last_events(self.core()).await
    }

    pub async fn get_events_str(&self) -> HarnessResult<String> {
        events_table(self.core()).await
    }
}
