//! Cluster members
//!
//! Operations shared by the monitor and data nodes: running `pg_autoctl`,
//! `pg_ctl` and `psql` on the member's node, controlling its background
//! `pg_autoctl` process and Postgres itself.

use shared::{exit_code, member_debug, member_info, member_warn};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use super::command::AutoCtlCommand;
use super::pg_node::{first_value, PgNode};
use crate::error::{HarnessError, HarnessResult};
use crate::network::CommandLine;
use crate::runtime::context::ClusterContext;
use crate::runtime::process::{CapturedOutput, CommandOutput, ManagedProcess, WaitOutcome};

/// `pg_ctl stop` races with `pg_autoctl` restarting Postgres, so it is retried
const STOP_POSTGRES_ATTEMPTS: u32 = 60;
const STOP_POSTGRES_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ClusterMember {
    core: Arc<PgNode>,
    ctx: Arc<ClusterContext>,
}

impl Deref for ClusterMember {
    type Target = PgNode;

    fn deref(&self) -> &PgNode {
        &self.core
    }
}

impl ClusterMember {
    pub(crate) fn new(core: Arc<PgNode>, ctx: Arc<ClusterContext>) -> Self {
        Self { core, ctx }
    }

    pub fn core(&self) -> &Arc<PgNode> {
        &self.core
    }

    pub fn context(&self) -> &Arc<ClusterContext> {
        &self.ctx
    }

    /// Resolve a `pg_autoctl` command for this member's data directory
    pub fn autoctl(&self, command: &AutoCtlCommand) -> HarnessResult<CommandLine> {
        let config = self.core.config();
        command.build(&config.pg_autoctl, self.core.datadir(), config.child_env())
    }

    fn pg_ctl<I, S>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = self.core.config();
        CommandLine::from_path(&config.pg_ctl)
            .arg("-D")
            .arg(self.core.datadir().display().to_string())
            .args(args)
            .envs(config.child_env())
    }

    pub(crate) fn psql(&self, sql: &str) -> CommandLine {
        let config = self.core.config();
        CommandLine::from_path(&config.psql)
            .args(["-d", self.core.database()])
            .args(["-p".to_string(), self.core.port().to_string()])
            .args(["-c", sql])
            .envs(config.child_env())
    }

    /// Run a `pg_autoctl` command to completion within the default timeout
    pub async fn execute(&self, name: &str, command: AutoCtlCommand) -> HarnessResult<CommandOutput> {
        self.execute_with_timeout(name, command, self.core.config().command_timeout())
            .await
    }

    /// Run a `pg_autoctl` command to completion
    ///
    /// A timeout emits the cluster diagnostics before failing.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        command: AutoCtlCommand,
        timeout: Duration,
    ) -> HarnessResult<CommandOutput> {
        let command = self.autoctl(&command)?;
        match self.run_command(name, command, timeout).await {
            Err(err @ HarnessError::CommandTimedOut { .. }) => {
                self.ctx.print_debug_logs().await;
                Err(err)
            }
            other => other,
        }
    }

    async fn run_command(&self, name: &str, command: CommandLine, timeout: Duration) -> HarnessResult<CommandOutput> {
        let mut process = ManagedProcess::new(name);
        process
            .run_to_completion(self.core.vnode(), command, timeout, &self.ctx)
            .await
    }

    /// Start a `pg_autoctl` command in the background slot
    pub async fn start_background(&self, command: &AutoCtlCommand) -> HarnessResult<()> {
        let command = self.autoctl(command)?;
        let mut slot = self.core.process.lock().await;
        slot.start_background(self.core.vnode(), command)
    }

    /// `pg_autoctl run` in the background
    pub async fn run(&self, level: &str) -> HarnessResult<()> {
        self.start_background(&AutoCtlCommand::new(["run", level])).await
    }

    pub async fn running(&self) -> bool {
        self.core.process.lock().await.is_running()
    }

    /// Output of the background process read so far
    pub async fn captured_output(&self) -> CapturedOutput {
        self.core.process.lock().await.captured()
    }

    /// Sleep while the cluster keeps being drained
    pub async fn sleep(&self, duration: Duration) {
        self.ctx.sleep(duration).await;
    }

    /// Stop the background `pg_autoctl` process
    pub async fn stop_pg_autoctl(&self) -> HarnessResult<Option<CapturedOutput>> {
        let mut slot = self.core.process.lock().await;
        slot.terminate(&self.ctx).await
    }

    /// `pg_ctl --wait --mode fast stop`, retried while it does not finish
    ///
    /// Returns `false` when `pg_ctl` itself fails.
    pub async fn stop_postgres(&self) -> HarnessResult<bool> {
        for attempt in 1..=STOP_POSTGRES_ATTEMPTS {
            let mut process = ManagedProcess::new("pg_ctl stop");
            process.start_scoped(self.core.vnode(), self.pg_ctl(["--wait", "--mode", "fast", "stop"]))?;

            match process.wait_for_exit(STOP_POSTGRES_TIMEOUT).await? {
                WaitOutcome::Exited(0) => return Ok(true),
                WaitOutcome::Exited(returncode) => {
                    let output = process.captured();
                    member_warn!(
                        self.core.id(),
                        "stopping postgres failed ({}), out: {}, err: {}",
                        returncode,
                        output.stdout,
                        output.stderr
                    );
                    return Ok(false);
                }
                WaitOutcome::StillRunning | WaitOutcome::NotStarted => {
                    member_info!(self.core.id(), "pg_ctl stop still running (attempt {})", attempt);
                }
            }
        }

        Err(HarnessError::StopFailed {
            name: format!("postgres for {}", self.core.id()),
            attempts: STOP_POSTGRES_ATTEMPTS,
        })
    }

    async fn pg_ctl_action(&self, action: &str) -> HarnessResult<bool> {
        let mut process = ManagedProcess::new(format!("pg_ctl {action}"));
        process.start_scoped(self.core.vnode(), self.pg_ctl([action]))?;

        match self.ctx.communicate(&mut process, self.core.config().command_timeout()).await {
            Ok(output) => match process.returncode() {
                Some(0) => Ok(true),
                returncode => {
                    member_warn!(
                        self.core.id(),
                        "{} postgres failed ({:?}), out: {}, err: {}",
                        action,
                        returncode,
                        output.stdout,
                        output.stderr
                    );
                    Ok(false)
                }
            },
            Err(err @ HarnessError::CommandTimedOut { .. }) => {
                member_warn!(self.core.id(), "{} postgres timed out", action);
                self.ctx.print_debug_logs().await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// `pg_ctl reload`; `false` when `pg_ctl` fails, an error when it hangs
    pub async fn reload_postgres(&self) -> HarnessResult<bool> {
        self.pg_ctl_action("reload").await
    }

    pub async fn restart_postgres(&self) -> HarnessResult<bool> {
        self.pg_ctl_action("restart").await
    }

    /// Run a command whose documented failure exit codes mean `false`
    ///
    /// Any other failure is still an error.
    pub(crate) async fn execute_flag(
        &self,
        name: &str,
        command: AutoCtlCommand,
        false_codes: &[i32],
    ) -> HarnessResult<bool> {
        match self.execute(name, command).await {
            Ok(_) => Ok(true),
            Err(err) if err.returncode().is_some_and(|code| false_codes.contains(&code)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// `pg_autoctl do pgsetup ready`
    pub async fn pg_is_running(&self) -> HarnessResult<bool> {
        self.execute_flag(
            "pgsetup ready",
            AutoCtlCommand::new(["do", "pgsetup", "ready", "-vvv"]),
            &[exit_code::PGSQL, exit_code::PGCTL],
        )
        .await
    }

    /// `pg_autoctl do pgsetup wait`, bounded by `timeout`
    ///
    /// A nonzero exit or a timeout is reported as `false`.
    pub async fn wait_until_pg_is_running(&self, timeout: Duration) -> HarnessResult<bool> {
        let command = self.autoctl(&AutoCtlCommand::new(["do", "pgsetup", "wait", "-vvv"]))?;
        match self.run_command("pgsetup wait", command, timeout).await {
            Ok(_) => Ok(true),
            Err(HarnessError::CommandFailed { returncode, .. }) => {
                member_warn!(self.core.id(), "postgres is not running (exit {})", returncode);
                Ok(false)
            }
            Err(HarnessError::CommandTimedOut { .. }) => {
                member_warn!(self.core.id(), "postgres is not running after {:?}", timeout);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Simulate a node failure: stop `pg_autoctl`, then Postgres
    pub async fn fail(&self) -> HarnessResult<()> {
        member_info!(self.core.id(), "💥 failing node");
        self.stop_pg_autoctl().await?;
        self.stop_postgres().await?;
        Ok(())
    }

    /// `pg_autoctl config get <setting>`, without the trailing newline
    pub async fn config_get(&self, setting: &str) -> HarnessResult<String> {
        let output = self
            .execute(
                &format!("config get {setting}"),
                AutoCtlCommand::new(["config", "get", setting]),
            )
            .await?;
        Ok(output
            .stdout
            .strip_suffix('\n')
            .unwrap_or(&output.stdout)
            .to_string())
    }

    pub async fn config_set(&self, setting: &str, value: &str) -> HarnessResult<()> {
        self.execute(
            &format!("config set {setting}"),
            AutoCtlCommand::new(["config", "set", setting, value]),
        )
        .await?;
        Ok(())
    }

    /// `pg_autoctl show uri`, optionally as JSON
    pub async fn show_uri(&self, json: bool) -> HarnessResult<String> {
        let mut command = AutoCtlCommand::new(["show", "uri"]);
        if json {
            command = command.arg("--json");
        }
        Ok(self.execute("show uri", command).await?.stdout)
    }

    pub async fn show_uri_json(&self) -> HarnessResult<serde_json::Value> {
        let raw = self.show_uri(true).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Current value of a Postgres setting
    pub async fn pg_config_get(&self, setting: &str) -> HarnessResult<String> {
        let rows = self.core.run_sql_query(&format!("SHOW {setting}"), &[]).await?;
        first_value(rows)
            .map(|value| value.to_text())
            .ok_or_else(|| HarnessError::unexpected(format!("setting {setting}"), ""))
    }

    /// `ALTER USER ... WITH PASSWORD` through psql
    ///
    /// Later connections as `username` use the new password.
    pub async fn set_user_password(&self, username: &str, password: &str) -> HarnessResult<()> {
        let sql = format!("alter user {username} with password '{password}'");
        self.core
            .vnode()
            .run_and_wait(&self.psql(&sql), "user passwd")
            .await?;
        self.core.record_password(username, password);
        Ok(())
    }

    pub async fn ifdown(&self) -> HarnessResult<()> {
        self.core.vnode().ifdown().await
    }

    pub async fn ifup(&self) -> HarnessResult<()> {
        self.core.vnode().ifup().await
    }

    pub async fn logs(&self) -> String {
        self.core.logs(&self.ctx).await
    }

    pub async fn print_debug_logs(&self) {
        self.ctx.print_debug_logs().await;
    }

    /// Stop the background process, run the `drop ... --destroy` command and
    /// remove the config and state files
    ///
    /// A failing drop command is only logged.
    pub(crate) async fn teardown(&self, drop: AutoCtlCommand) -> HarnessResult<()> {
        let stopped = self.stop_pg_autoctl().await;
        if let Ok(Some(output)) = &stopped {
            member_debug!(
                self.core.id(),
                "final pg_autoctl output:\n{}\n{}",
                output.stdout,
                output.stderr
            );
        }

        if let Err(err) = self.execute("pg_autoctl drop --destroy", drop).await {
            member_warn!(self.core.id(), "destroy failed: {}", err);
        }

        let removed = self.core.remove_state_files().await;
        stopped?;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HarnessConfig, TlsOptions};
    use crate::network::HostNode;
    use crate::node::pg_node::NodeParams;
    use shared::{MemberId, Role};
    use std::net::{IpAddr, Ipv4Addr};
    use std::path::PathBuf;

    fn make_member(config: HarnessConfig) -> ClusterMember {
        let config = Arc::new(config);
        let core = Arc::new(PgNode::new(NodeParams {
            id: MemberId::DataNode(1),
            role: Role::Postgres,
            vnode: Arc::new(HostNode::new(IpAddr::V4(Ipv4Addr::LOCALHOST))),
            config: config.clone(),
            datadir: PathBuf::from("/tmp/harness/node1"),
            port: 5501,
            username: "postgres".to_string(),
            database: "postgres".to_string(),
            auth_method: None,
            tls: TlsOptions::default(),
        }));
        ClusterMember::new(core, Arc::new(ClusterContext::new(config)))
    }

    #[test]
    fn test_autoctl_injects_pgdata() {
        let member = make_member(HarnessConfig::default());
        let command = member
            .autoctl(&AutoCtlCommand::new(["show", "uri"]).arg("--json"))
            .unwrap();
        assert_eq!(command.to_string(), "pg_autoctl show uri --json --pgdata /tmp/harness/node1");
    }

    #[test]
    fn test_pg_ctl_and_psql_command_lines() {
        let member = make_member(HarnessConfig::default());
        assert_eq!(
            member.pg_ctl(["--wait", "--mode", "fast", "stop"]).to_string(),
            "pg_ctl -D /tmp/harness/node1 --wait --mode fast stop"
        );
        assert_eq!(
            member.psql("select 1").to_string(),
            "psql -d postgres -p 5501 -c select 1"
        );
    }

    #[tokio::test]
    async fn test_execute_failure_carries_returncode() {
        let member = make_member(HarnessConfig::builder().pg_autoctl("false").build().unwrap());
        let err = member
            .execute("show state", AutoCtlCommand::new(["show", "state"]))
            .await
            .unwrap_err();
        assert_eq!(err.returncode(), Some(1));
    }

    #[tokio::test]
    async fn test_hanging_pg_ctl_reload_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pg_ctl = dir.path().join("pg_ctl");
        std::fs::write(&pg_ctl, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&pg_ctl, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = HarnessConfig::builder()
            .pg_ctl(&pg_ctl)
            .command_timeout(Duration::from_millis(1500))
            .build()
            .unwrap();
        let member = make_member(config);

        match member.reload_postgres().await {
            Err(HarnessError::CommandTimedOut { name, timeout, .. }) => {
                assert_eq!(name, "pg_ctl reload");
                assert_eq!(timeout, Duration::from_millis(1500));
            }
            other => panic!("expected CommandTimedOut, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failing_pg_ctl_restart_is_false() {
        let member = make_member(HarnessConfig::builder().pg_ctl("false").build().unwrap());
        assert!(!member.restart_postgres().await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_until_pg_is_running_maps_failure_to_false() {
        let member = make_member(HarnessConfig::builder().pg_autoctl("false").build().unwrap());
        assert!(!member.wait_until_pg_is_running(Duration::from_secs(2)).await.unwrap());

        let member = make_member(HarnessConfig::builder().pg_autoctl("true").build().unwrap());
        assert!(member.wait_until_pg_is_running(Duration::from_secs(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_pg_is_running_rejects_unexpected_exit_codes() {
        // `false` exits with 1, which is not a "postgres is down" code
        let member = make_member(HarnessConfig::builder().pg_autoctl("false").build().unwrap());
        assert!(matches!(
            member.pg_is_running().await,
            Err(HarnessError::CommandFailed { returncode: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_postgres_reports_failure() {
        let member = make_member(HarnessConfig::builder().pg_ctl("false").build().unwrap());
        assert!(!member.stop_postgres().await.unwrap());

        let member = make_member(HarnessConfig::builder().pg_ctl("true").build().unwrap());
        assert!(member.stop_postgres().await.unwrap());
        assert!(member.reload_postgres().await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_pg_autoctl_when_idle() {
        let member = make_member(HarnessConfig::default());
        assert!(!member.running().await);
        assert_eq!(member.stop_pg_autoctl().await.unwrap(), None);
    }
}
