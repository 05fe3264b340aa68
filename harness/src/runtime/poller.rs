//! State convergence polling
//!
//! Waits for a member's reported state to reach a target, sleeping through
//! the cluster drain between polls. There is no backoff: the interval is
//! fixed and the deadline is absolute.

use async_trait::async_trait;
use shared::{member_info, NodeState};
use std::time::Duration;
use tokio::time::Instant;

use super::context::ClusterContext;
use crate::config::harness::{POLLING_INTERVAL_SECS, STATE_CHANGE_TIMEOUT_SECS};
use crate::error::{HarnessError, HarnessResult};

/// Something whose reported state can be polled
#[mockall::automock]
#[async_trait]
pub trait StateProbe: Send + Sync {
    /// Name used in logs and errors
    fn label(&self) -> String;

    async fn current_state(&self) -> HarnessResult<NodeState>;

    /// Emit whatever helps explain a missed deadline
    async fn dump_diagnostics(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePoller {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for ConvergencePoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs_f64(POLLING_INTERVAL_SECS),
            deadline: Duration::from_secs_f64(STATE_CHANGE_TIMEOUT_SECS),
        }
    }
}

impl ConvergencePoller {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub async fn wait_until_state<P>(&self, ctx: &ClusterContext, probe: &P, target: &NodeState) -> HarnessResult<()>
    where
        P: StateProbe + ?Sized,
    {
        let label = probe.label();
        let started = Instant::now();
        let mut last_observed: Option<NodeState> = None;

        while started.elapsed() < self.deadline {
            ctx.sleep(self.interval).await;

            let current = probe.current_state().await?;

            if last_observed.as_ref() != Some(&current) {
                if &current == target {
                    member_info!(label, "✅ state is '{}', done waiting", current);
                } else {
                    member_info!(label, "⏳ state is '{}', waiting for '{}'", current, target);
                }
            }

            if &current == target {
                return Ok(());
            }
            last_observed = Some(current);
        }

        probe.dump_diagnostics().await;
        Err(HarnessError::ConvergenceTimeout {
            member: label,
            target: target.clone(),
            last_observed,
            deadline: self.deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use std::sync::Arc;

    fn context() -> ClusterContext {
        ClusterContext::new(Arc::new(HarnessConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_on_first_tick() {
        let ctx = context();
        let mut probe = MockStateProbe::new();
        probe.expect_label().return_const("node1".to_string());
        probe
            .expect_current_state()
            .times(1)
            .returning(|| Ok(NodeState::Single));
        probe.expect_dump_diagnostics().never();

        let poller = ConvergencePoller::default();
        let started = Instant::now();
        poller.wait_until_state(&ctx, &probe, &NodeState::Single).await.unwrap();

        assert_eq!(started.elapsed(), poller.interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_converges_after_transitions() {
        let ctx = context();
        let mut probe = MockStateProbe::new();
        let mut seq = mockall::Sequence::new();
        probe.expect_label().return_const("node2".to_string());
        probe
            .expect_current_state()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|| Ok(NodeState::CatchingUp));
        probe
            .expect_current_state()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(NodeState::Secondary));

        let poller = ConvergencePoller::default();
        poller.wait_until_state(&ctx, &probe, &NodeState::Secondary).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_state_times_out() {
        let ctx = context();
        let mut probe = MockStateProbe::new();
        probe.expect_label().return_const("node1".to_string());
        probe
            .expect_current_state()
            .returning(|| Ok(NodeState::WaitPrimary));
        probe.expect_dump_diagnostics().times(1).return_const(());

        let poller = ConvergencePoller::new(Duration::from_millis(100), Duration::from_secs(5));
        let started = Instant::now();
        let err = poller
            .wait_until_state(&ctx, &probe, &NodeState::Primary)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed <= Duration::from_millis(5200));
        match err {
            HarnessError::ConvergenceTimeout { member, target, last_observed, deadline } => {
                assert_eq!(member, "node1");
                assert_eq!(target, NodeState::Primary);
                assert_eq!(last_observed, Some(NodeState::WaitPrimary));
                assert_eq!(deadline, Duration::from_secs(5));
            }
            other => panic!("expected ConvergenceTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_is_propagated() {
        let ctx = context();
        let mut probe = MockStateProbe::new();
        probe.expect_label().return_const("node3".to_string());
        probe.expect_current_state().times(1).returning(|| {
            Err(HarnessError::NodeNotFound {
                node_id: 3,
                group_id: 0,
            })
        });

        let result = ConvergencePoller::default()
            .wait_until_state(&ctx, &probe, &NodeState::Single)
            .await;
        assert!(matches!(result, Err(HarnessError::NodeNotFound { node_id: 3, .. })));
    }
}
