//! Host network
//!
//! Every node runs directly on the local host. Nodes get distinct loopback
//! addresses (the whole of 127.0.0.0/8 routes to `lo` on Linux) so that
//! connection strings still tell members apart; interface toggling is not
//! available and only logged.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::process::Child;
use tracing::{debug, warn};

use super::{CommandLine, NodeHandle, VirtualNetwork};
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::process::{exit_code_of, CommandOutput};

pub struct HostNetwork {
    base: Ipv4Addr,
    created: AtomicU32,
}

impl HostNetwork {
    pub fn new(base: Ipv4Addr) -> Self {
        Self {
            base,
            created: AtomicU32::new(0),
        }
    }

    fn next_address(&self) -> Ipv4Addr {
        let offset = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ipv4Addr::from(u32::from(self.base).wrapping_add(offset))
    }
}

#[async_trait]
impl VirtualNetwork for HostNetwork {
    fn create_node(&self) -> HarnessResult<Arc<dyn NodeHandle>> {
        let address = self.next_address();
        debug!("🖥️ Created host node at {}", address);
        Ok(Arc::new(HostNode::new(IpAddr::V4(address))))
    }

    async fn destroy(&self) -> HarnessResult<()> {
        debug!("🧹 Host network released {} nodes", self.created.load(Ordering::SeqCst));
        Ok(())
    }
}

pub struct HostNode {
    address: IpAddr,
}

impl HostNode {
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }

    fn spawn(command: &CommandLine, detached: bool) -> HarnessResult<Child> {
        let mut cmd = command.to_command();
        if detached {
            // own process group so the whole tree can be signalled at once
            cmd.process_group(0);
        } else {
            cmd.kill_on_drop(true);
        }
        cmd.spawn().map_err(|source| HarnessError::Spawn {
            command_line: command.to_string(),
            source,
        })
    }
}

#[async_trait]
impl NodeHandle for HostNode {
    fn address(&self) -> IpAddr {
        self.address
    }

    fn run_detached(&self, command: &CommandLine) -> HarnessResult<Child> {
        Self::spawn(command, true)
    }

    fn run_scoped(&self, command: &CommandLine) -> HarnessResult<Child> {
        Self::spawn(command, false)
    }

    async fn run_and_wait(&self, command: &CommandLine, name: &str) -> HarnessResult<CommandOutput> {
        let child = Self::spawn(command, false)?;
        let output = child.wait_with_output().await?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            returncode: exit_code_of(output.status),
        };

        if result.returncode != 0 {
            return Err(HarnessError::CommandFailed {
                name: name.to_string(),
                command_line: command.to_string(),
                stdout: result.stdout,
                stderr: result.stderr,
                returncode: result.returncode,
            });
        }
        Ok(result)
    }

    async fn ifup(&self) -> HarnessResult<()> {
        warn!("⚠️ ifup is not supported on the host network ({})", self.address);
        Ok(())
    }

    async fn ifdown(&self) -> HarnessResult<()> {
        warn!("⚠️ ifdown is not supported on the host network ({})", self.address);
        Ok(())
    }
}
