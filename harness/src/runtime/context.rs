//! Cluster-wide drain context
//!
//! Shared by the cluster and every member. It knows the registered members
//! and owns the primitives that keep their pipes drained while anything
//! waits: `flush_all`, `sleep` and `communicate`.

use shared::logging::log_diagnostics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::budget::TimeoutBudget;
use super::process::{CapturedOutput, ManagedProcess, WaitOutcome};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::node::monitor::events_table;
use crate::node::PgNode;

/// How long a flush may read from a single member
pub const FLUSH_BUDGET: Duration = Duration::from_millis(1);

#[derive(Default)]
struct MemberSet {
    datanodes: Vec<Arc<PgNode>>,
    monitor: Option<Arc<PgNode>>,
}

pub struct ClusterContext {
    config: Arc<HarnessConfig>,
    members: RwLock<MemberSet>,
}

impl ClusterContext {
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self {
            config,
            members: RwLock::new(MemberSet::default()),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub(crate) async fn register_monitor(&self, monitor: Arc<PgNode>) -> HarnessResult<()> {
        let mut members = self.members.write().await;
        if members.monitor.is_some() {
            return Err(HarnessError::AlreadyExists {
                what: "monitor".to_string(),
            });
        }
        members.monitor = Some(monitor);
        Ok(())
    }

    pub(crate) async fn register_datanode(&self, node: Arc<PgNode>) {
        self.members.write().await.datanodes.push(node);
    }

    pub(crate) async fn clear(&self) {
        let mut members = self.members.write().await;
        members.datanodes.clear();
        members.monitor = None;
    }

    pub async fn monitor(&self) -> Option<Arc<PgNode>> {
        self.members.read().await.monitor.clone()
    }

    /// Data nodes in creation order, then the monitor
    pub async fn nodes(&self) -> Vec<Arc<PgNode>> {
        let members = self.members.read().await;
        members
            .datanodes
            .iter()
            .chain(members.monitor.iter())
            .cloned()
            .collect()
    }

    /// Drain every member's background process without waiting on any
    ///
    /// A member whose slot is currently held (its owner is waiting on it) is
    /// skipped. Never fails.
    pub async fn flush_all(&self) {
        for node in self.nodes().await {
            node.flush_output().await;
        }
    }

    /// Sleep while flushing the cluster at least once a second
    pub async fn sleep(&self, duration: Duration) {
        for tick in TimeoutBudget::new(duration).ticks() {
            self.flush_all().await;
            tokio::time::sleep(tick.duration()).await;
        }
    }

    /// Wait for `process` to exit, flushing the cluster at least once a second
    ///
    /// Returns as soon as the process exits.
    pub async fn communicate(&self, process: &mut ManagedProcess, timeout: Duration) -> HarnessResult<CapturedOutput> {
        for tick in TimeoutBudget::new(timeout).ticks() {
            self.flush_all().await;
            match process.wait_for_exit(tick.duration()).await? {
                WaitOutcome::StillRunning => {}
                WaitOutcome::Exited(_) | WaitOutcome::NotStarted => return Ok(process.captured()),
            }
        }

        debug!("⏰ {} still running after {:?}", process.name(), timeout);
        Err(HarnessError::CommandTimedOut {
            name: process.name().to_string(),
            command_line: process.command_string(),
            timeout,
        })
    }

    /// Emit monitor events plus every member's output and Postgres logs
    ///
    /// Background processes are stopped so that their full output is
    /// available.
    pub async fn print_debug_logs(&self) {
        let mut bundle = String::new();

        if let Some(monitor) = self.monitor().await {
            let events = match events_table(&monitor).await {
                Ok(table) => table,
                Err(err) => format!("unavailable: {err}"),
            };
            bundle.push_str(&format!("MONITOR EVENTS:\n{events}\n"));
        }

        for node in self.nodes().await {
            bundle.push_str(&node.logs(self).await);
        }

        log_diagnostics("Cluster diagnostics", &bundle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{CommandLine, HostNode};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::Instant;

    fn context() -> ClusterContext {
        ClusterContext::new(Arc::new(HarnessConfig::default()))
    }

    #[tokio::test]
    async fn test_flush_all_without_members() {
        let ctx = context();
        ctx.flush_all().await;
        assert!(ctx.nodes().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_consumes_whole_budget() {
        let ctx = context();
        let started = Instant::now();
        ctx.sleep(Duration::from_millis(2500)).await;
        assert_eq!(started.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn test_communicate_returns_on_exit() {
        let ctx = context();
        let node = HostNode::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut process = ManagedProcess::new("quick");
        process
            .start_background(&node, CommandLine::new("sh").args(["-c", "sleep 0.2; echo bye"]))
            .unwrap();

        let started = std::time::Instant::now();
        let output = ctx.communicate(&mut process, Duration::from_secs(10)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(output.stdout, "bye\n");
    }

    #[tokio::test]
    async fn test_communicate_times_out_within_bound() {
        let ctx = context();
        let node = HostNode::new(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut process = ManagedProcess::new("sleeper");
        process
            .start_background(&node, CommandLine::new("sleep").arg("30"))
            .unwrap();

        let started = std::time::Instant::now();
        let err = ctx
            .communicate(&mut process, Duration::from_millis(1500))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(2500));
        match err {
            HarnessError::CommandTimedOut { name, command_line, .. } => {
                assert_eq!(name, "sleeper");
                assert_eq!(command_line, "sleep 30");
            }
            other => panic!("expected CommandTimedOut, got {other:?}"),
        }

        assert!(process.terminate(&ctx).await.unwrap().is_some());
    }
}
