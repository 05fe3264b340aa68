//! Cluster Runtime
//!
//! Process management, the cluster-wide drain primitives, state polling and
//! the cluster itself.

pub mod budget;
pub mod cluster;
pub mod context;
pub mod poller;
pub mod process;

// Re-export main types
pub use budget::{Tick, TimeoutBudget};
pub use cluster::Cluster;
pub use context::ClusterContext;
pub use poller::{ConvergencePoller, StateProbe};
pub use process::{CapturedOutput, CommandOutput, ManagedProcess, WaitOutcome};
