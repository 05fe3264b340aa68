//! Managed external processes
//!
//! A [`ManagedProcess`] owns at most one live child at a time together with
//! everything read from its pipes so far. Pipes are read chunk by chunk and
//! every chunk is appended to the buffers as soon as it arrives, so a wait
//! that runs out of budget loses nothing and can simply be resumed later.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tracing::{debug, info, warn};

use super::context::ClusterContext;
use crate::error::{HarnessError, HarnessResult};
use crate::network::{CommandLine, NodeHandle};

const CHUNK_SIZE: usize = 8192;

/// Everything a process wrote, decoded lossily
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Result of a command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Nothing was ever started
    NotStarted,
    Exited(i32),
    StillRunning,
}

/// Exit code, or the negated signal number for a killed process
pub fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| -sig))
        .unwrap_or(-1)
}

struct LiveProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl LiveProcess {
    fn new(mut child: Child) -> Self {
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Self {
            child,
            pid,
            stdout,
            stderr,
        }
    }
}

enum ProcessState {
    Idle,
    Running(LiveProcess),
    Exited { returncode: i32 },
}

enum PipeEvent {
    Stdout(std::io::Result<usize>),
    Stderr(std::io::Result<usize>),
}

pub struct ManagedProcess {
    name: String,
    command: Option<CommandLine>,
    state: ProcessState,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ManagedProcess {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            command: None,
            state: ProcessState::Idle,
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ProcessState::Running(_))
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            ProcessState::Running(live) => live.pid,
            _ => None,
        }
    }

    pub fn returncode(&self) -> Option<i32> {
        match self.state {
            ProcessState::Exited { returncode } => Some(returncode),
            _ => None,
        }
    }

    pub fn command_line(&self) -> Option<&CommandLine> {
        self.command.as_ref()
    }

    /// Output read so far
    pub fn captured(&self) -> CapturedOutput {
        CapturedOutput {
            stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr).into_owned(),
        }
    }

    fn attach(&mut self, child: Child, command: CommandLine) {
        self.state = ProcessState::Running(LiveProcess::new(child));
        self.command = Some(command);
        self.stdout.clear();
        self.stderr.clear();
    }

    /// Start `command` detached in its own process group
    ///
    /// A process that is still running is released, not killed.
    pub fn start_background(&mut self, node: &dyn NodeHandle, command: CommandLine) -> HarnessResult<()> {
        let child = node.run_detached(&command)?;
        if let ProcessState::Running(live) = std::mem::replace(&mut self.state, ProcessState::Idle) {
            warn!("⚠️ {} releases still running process [{}]", self.name, live.pid.unwrap_or_default());
            release(live);
        }
        info!("▶️ {} started [{}]: {}", self.name, child.id().unwrap_or_default(), command);
        self.attach(child, command);
        Ok(())
    }

    /// Start `command` so that it is killed once this process is dropped
    pub fn start_scoped(&mut self, node: &dyn NodeHandle, command: CommandLine) -> HarnessResult<()> {
        let child = node.run_scoped(&command)?;
        debug!("⚙️ {}: {}", self.name, command);
        self.attach(child, command);
        Ok(())
    }

    /// Run `command` until it exits, draining the cluster while waiting
    ///
    /// A nonzero exit is a `CommandFailed` carrying both streams.
    pub async fn run_to_completion(
        &mut self,
        node: &dyn NodeHandle,
        command: CommandLine,
        timeout: Duration,
        ctx: &ClusterContext,
    ) -> HarnessResult<CommandOutput> {
        self.start_scoped(node, command)?;
        let output = ctx.communicate(self, timeout).await?;

        let returncode = self.returncode().unwrap_or(-1);
        if returncode != 0 {
            return Err(HarnessError::CommandFailed {
                name: self.name.clone(),
                command_line: self.command_string(),
                stdout: output.stdout,
                stderr: output.stderr,
                returncode,
            });
        }

        Ok(CommandOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            returncode,
        })
    }

    /// Read both pipes until the process exits or `budget` elapses
    pub async fn wait_for_exit(&mut self, budget: Duration) -> HarnessResult<WaitOutcome> {
        let live = match &mut self.state {
            ProcessState::Running(live) => live,
            ProcessState::Exited { returncode } => return Ok(WaitOutcome::Exited(*returncode)),
            ProcessState::Idle => return Ok(WaitOutcome::NotStarted),
        };

        let waited = tokio::time::timeout(
            budget,
            read_until_exit(live, &mut self.stdout, &mut self.stderr),
        )
        .await;

        match waited {
            Ok(Ok(status)) => {
                let returncode = exit_code_of(status);
                debug!("⏹️ {} exited with {}", self.name, returncode);
                self.state = ProcessState::Exited { returncode };
                Ok(WaitOutcome::Exited(returncode))
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Ok(WaitOutcome::StillRunning),
        }
    }

    /// Consume whatever is available within `budget`
    pub async fn drain(&mut self, budget: Duration) {
        if let Err(err) = self.wait_for_exit(budget).await {
            warn!("⚠️ Draining {} failed: {}", self.name, err);
        }
    }

    /// Wait for exit and return the full output
    ///
    /// Calling this again after the process exited returns the same output.
    pub async fn read_final(&mut self, ctx: &ClusterContext) -> HarnessResult<CapturedOutput> {
        ctx.communicate(self, ctx.config().command_timeout()).await
    }

    /// Signal the process group until the background process exits
    ///
    /// Returns `None` when nothing is running or the process is already gone.
    pub async fn terminate(&mut self, ctx: &ClusterContext) -> HarnessResult<Option<CapturedOutput>> {
        let Some(pid) = self.pid() else {
            debug!("{} is not running", self.name);
            return Ok(None);
        };

        let attempts = ctx.config().termination_attempts;
        for attempt in 1..=attempts {
            let sig = if attempt > 1 && attempt == attempts {
                Signal::SIGKILL
            } else {
                Signal::SIGQUIT
            };
            info!("🛑 Terminating {} [{}] with {} (attempt {}/{})", self.name, pid, sig, attempt, attempts);

            match signal_group(pid, sig) {
                Ok(()) => {}
                Err(Errno::ESRCH) => {
                    warn!("⚠️ {} [{}] is already gone", self.name, pid);
                    self.state = ProcessState::Idle;
                    return Ok(None);
                }
                Err(errno) => return Err(std::io::Error::from(errno).into()),
            }

            match ctx.communicate(self, ctx.config().command_timeout()).await {
                Ok(output) => return Ok(Some(output)),
                Err(HarnessError::CommandTimedOut { .. }) => {
                    warn!("⚠️ {} [{}] did not exit after {}", self.name, pid, sig);
                }
                Err(err) => return Err(err),
            }
        }

        Err(HarnessError::StopFailed {
            name: self.name.clone(),
            attempts,
        })
    }

    pub(crate) fn command_string(&self) -> String {
        self.command.as_ref().map(ToString::to_string).unwrap_or_default()
    }
}

/// Keep a released child's pipes drained until it exits on its own
///
/// Dropping the read ends would kill it with SIGPIPE on its next write.
fn release(live: LiveProcess) {
    let LiveProcess {
        mut child,
        pid,
        stdout,
        stderr,
    } = live;

    tokio::spawn(async move {
        let drain_stdout = async {
            if let Some(mut pipe) = stdout {
                let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
            }
        };
        let drain_stderr = async {
            if let Some(mut pipe) = stderr {
                let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
            }
        };
        tokio::join!(drain_stdout, drain_stderr);

        match child.wait().await {
            Ok(status) => debug!("released process [{}] exited with {}", pid.unwrap_or_default(), exit_code_of(status)),
            Err(err) => debug!("released process [{}] could not be reaped: {}", pid.unwrap_or_default(), err),
        }
    });
}

/// Signal the child's own process group, or only the child when it shares
/// the harness's group
fn signal_group(pid: u32, sig: Signal) -> Result<(), Errno> {
    let pid = Pid::from_raw(i32::try_from(pid).map_err(|_| Errno::ESRCH)?);
    let pgid = unistd::getpgid(Some(pid))?;
    if pgid == pid {
        signal::killpg(pgid, sig)
    } else {
        signal::kill(pid, sig)
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn read_until_exit(
    live: &mut LiveProcess,
    stdout: &mut Vec<u8>,
    stderr: &mut Vec<u8>,
) -> std::io::Result<ExitStatus> {
    let mut out_chunk = [0u8; CHUNK_SIZE];
    let mut err_chunk = [0u8; CHUNK_SIZE];

    while live.stdout.is_some() || live.stderr.is_some() {
        let event = tokio::select! {
            n = read_pipe(&mut live.stdout, &mut out_chunk) => PipeEvent::Stdout(n),
            n = read_pipe(&mut live.stderr, &mut err_chunk) => PipeEvent::Stderr(n),
        };

        match event {
            PipeEvent::Stdout(Ok(0)) => live.stdout = None,
            PipeEvent::Stdout(Ok(n)) => stdout.extend_from_slice(&out_chunk[..n]),
            PipeEvent::Stdout(Err(err)) => {
                debug!("stdout pipe closed: {}", err);
                live.stdout = None;
            }
            PipeEvent::Stderr(Ok(0)) => live.stderr = None,
            PipeEvent::Stderr(Ok(n)) => stderr.extend_from_slice(&err_chunk[..n]),
            PipeEvent::Stderr(Err(err)) => {
                debug!("stderr pipe closed: {}", err);
                live.stderr = None;
            }
        }
    }

    live.child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::network::{HostNode, MockNodeHandle};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn context() -> ClusterContext {
        let config = HarnessConfig::builder()
            .command_timeout(Duration::from_secs(3))
            .termination_attempts(2)
            .build()
            .unwrap();
        ClusterContext::new(Arc::new(config))
    }

    fn host() -> HostNode {
        HostNode::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_run_to_completion_success() {
        let ctx = context();
        let mut process = ManagedProcess::new("echo");

        let output = process
            .run_to_completion(&host(), sh("echo out; echo err >&2"), Duration::from_secs(2), &ctx)
            .await
            .unwrap();

        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.returncode, 0);
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_run_to_completion_failure_carries_streams() {
        let ctx = context();
        let mut process = ManagedProcess::new("broken");

        let err = process
            .run_to_completion(&host(), sh("echo partial; echo boom >&2; exit 4"), Duration::from_secs(2), &ctx)
            .await
            .unwrap_err();

        match err {
            HarnessError::CommandFailed { name, stdout, stderr, returncode, command_line } => {
                assert_eq!(name, "broken");
                assert_eq!(stdout, "partial\n");
                assert_eq!(stderr, "boom\n");
                assert_eq!(returncode, 4);
                assert!(command_line.starts_with("sh -c"));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let ctx = context();
        let mut node = MockNodeHandle::new();
        node.expect_run_scoped().times(1).returning(|command| {
            Err(HarnessError::Spawn {
                command_line: command.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });

        let mut process = ManagedProcess::new("missing");
        let result = process
            .run_to_completion(&node, CommandLine::new("pg_autoctl"), Duration::from_secs(1), &ctx)
            .await;

        assert!(matches!(result, Err(HarnessError::Spawn { .. })));
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_wait_for_exit_keeps_partial_output() {
        let mut process = ManagedProcess::new("slow");
        process.start_background(&host(), sh("echo early; sleep 5")).unwrap();

        let outcome = process.wait_for_exit(Duration::from_millis(300)).await.unwrap();
        assert_eq!(outcome, WaitOutcome::StillRunning);
        assert_eq!(process.captured().stdout, "early\n");
        assert!(process.is_running());

        let ctx = context();
        let output = process.terminate(&ctx).await.unwrap().unwrap();
        assert_eq!(output.stdout, "early\n");
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_read_final_is_idempotent() {
        let ctx = context();
        let mut process = ManagedProcess::new("short");
        process.start_background(&host(), sh("echo done; echo warn >&2")).unwrap();

        let first = process.read_final(&ctx).await.unwrap();
        let second = process.read_final(&ctx).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.stdout, "done\n");
        assert_eq!(process.returncode(), Some(0));
    }

    #[tokio::test]
    async fn test_terminate_without_process() {
        let ctx = context();
        let mut process = ManagedProcess::new("idle");
        assert_eq!(process.terminate(&ctx).await.unwrap(), None);
        assert_eq!(process.wait_for_exit(Duration::from_millis(1)).await.unwrap(), WaitOutcome::NotStarted);
    }

    #[tokio::test]
    async fn test_terminate_escalates_when_signal_is_ignored() {
        let ctx = context();
        let mut process = ManagedProcess::new("stubborn");
        process
            .start_background(&host(), sh("trap '' QUIT; while true; do sleep 0.1; done"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let output = process.terminate(&ctx).await.unwrap();
        assert!(output.is_some());
        assert_eq!(process.returncode(), Some(-9));
    }

    #[tokio::test]
    async fn test_restart_keeps_released_process_alive() {
        let ctx = context();
        let mut process = ManagedProcess::new("chatty");
        process
            .start_background(&host(), sh("while true; do echo tick; echo err >&2; sleep 0.1; done"))
            .unwrap();
        let released = process.pid().unwrap();

        process.start_background(&host(), sh("exec sleep 5")).unwrap();
        assert_ne!(process.pid(), Some(released));
        tokio::time::sleep(Duration::from_millis(800)).await;

        let released = Pid::from_raw(released as i32);
        assert!(signal::kill(released, None).is_ok(), "released process was killed");

        signal::killpg(released, Signal::SIGKILL).unwrap();
        assert!(process.terminate(&ctx).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_terminate_scoped_process_signals_only_the_child() {
        let ctx = context();
        let mut process = ManagedProcess::new("scoped");
        process.start_scoped(&host(), sh("exec sleep 5")).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let output = process.terminate(&ctx).await.unwrap();

        // reaching this point means the harness's own group was left alone
        assert!(output.is_some());
        assert_eq!(process.returncode(), Some(-(Signal::SIGQUIT as i32)));
    }

    #[test]
    fn test_exit_code_of_signal() {
        let status = ExitStatus::from_raw(9);
        assert_eq!(exit_code_of(status), -9);
        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(exit_code_of(status), 3);
    }
}
