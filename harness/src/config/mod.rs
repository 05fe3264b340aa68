//! Configuration Management
//!
//! This module provides the immutable harness configuration, its builder,
//! and per-node creation options.

pub mod builder;
pub mod harness;
pub mod node_options;

// Re-export main types
pub use builder::HarnessConfigBuilder;
pub use harness::HarnessConfig;
pub use node_options::{DataNodeOptions, MonitorOptions, TlsOptions};
