//! Node Execution Contexts
//!
//! The harness never starts processes by itself: every command runs inside a
//! [`NodeHandle`] handed out by a [`VirtualNetwork`]. These traits are the
//! seam to whatever provides isolated, addressable nodes.

pub mod host;

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};

use crate::error::HarnessResult;
use crate::runtime::process::CommandOutput;

pub use host::{HostNetwork, HostNode};

/// A fully resolved command: program, arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandLine {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn from_path(program: &Path) -> Self {
        Self::new(program.display().to_string())
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs<I>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(env);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Build a tokio command with piped output and no stdin
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// An addressable execution context
#[mockall::automock]
#[async_trait]
pub trait NodeHandle: Send + Sync {
    /// Address other nodes use to reach this one
    fn address(&self) -> IpAddr;

    /// Start a long-running process in its own process group
    ///
    /// The caller owns the returned child; dropping it does not kill the
    /// process.
    fn run_detached(&self, command: &CommandLine) -> HarnessResult<Child>;

    /// Start a process that is killed when the returned child is dropped
    fn run_scoped(&self, command: &CommandLine) -> HarnessResult<Child>;

    /// Run a command to completion, failing on a nonzero exit
    async fn run_and_wait(&self, command: &CommandLine, name: &str) -> HarnessResult<CommandOutput>;

    /// Bring this node's network interface up
    async fn ifup(&self) -> HarnessResult<()>;

    /// Take this node's network interface down
    async fn ifdown(&self) -> HarnessResult<()>;
}

/// Provider of isolated, addressable nodes
#[mockall::automock]
#[async_trait]
pub trait VirtualNetwork: Send + Sync {
    /// Create a new node with its own address
    fn create_node(&self) -> HarnessResult<Arc<dyn NodeHandle>>;

    /// Release everything the network created
    async fn destroy(&self) -> HarnessResult<()>;
}
