//! Shared types for the pg_auto_failover test harness
//!
//! Contains the vocabulary every harness component speaks: node roles,
//! formation features, reported node states, TLS modes, member identity,
//! and the member-aware logging macros.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
