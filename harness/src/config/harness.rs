//! Harness Configuration
//!
//! Immutable settings handed to the cluster at construction time. Nothing in
//! the harness reads or mutates the process environment after this is built;
//! child processes get their environment from [`HarnessConfig::child_env`].

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Default bound for a single `pg_autoctl` command
pub const COMMAND_TIMEOUT_SECS: f64 = 60.0;
/// Default pause between two convergence polls
pub const POLLING_INTERVAL_SECS: f64 = 0.1;
/// Default deadline for a node to reach a target state
pub const STATE_CHANGE_TIMEOUT_SECS: f64 = 90.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path to the `pg_autoctl` binary
    pub pg_autoctl: PathBuf,
    /// Path to `pg_ctl`, handed to `pg_autoctl create --pgctl`
    pub pg_ctl: PathBuf,
    /// Path to `psql`
    pub psql: PathBuf,
    /// Postgres major version, used for `pg_createcluster`
    pub pg_version: String,
    /// Default `PGHOST` for child processes
    pub pghost: String,
    /// Unix socket directory; overrides `pghost` for data nodes when set
    pub socket_dir: Option<PathBuf>,
    /// Export `PG_AUTOCTL_DEBUG` so that `pg_autoctl do ...` commands exist
    pub autoctl_debug: bool,
    /// OS user owning the data nodes
    pub username: String,
    /// Home directory where `pg_autoctl` keeps config and state files
    pub home: PathBuf,
    /// First address handed out by the host network (exclusive)
    pub network_base: Ipv4Addr,
    pub command_timeout_secs: f64,
    pub poll_interval_secs: f64,
    pub state_change_timeout_secs: f64,
    /// Signals sent to a background process before giving up on it
    pub termination_attempts: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            pg_autoctl: PathBuf::from("pg_autoctl"),
            pg_ctl: PathBuf::from("pg_ctl"),
            psql: PathBuf::from("psql"),
            pg_version: "11".to_string(),
            pghost: "localhost".to_string(),
            socket_dir: None,
            autoctl_debug: true,
            username: "postgres".to_string(),
            home: PathBuf::from("/tmp"),
            network_base: Ipv4Addr::new(127, 27, 1, 0),
            command_timeout_secs: COMMAND_TIMEOUT_SECS,
            poll_interval_secs: POLLING_INTERVAL_SECS,
            state_change_timeout_secs: STATE_CHANGE_TIMEOUT_SECS,
            termination_attempts: 3,
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::HarnessConfigBuilder {
        crate::config::builder::HarnessConfigBuilder::new()
    }

    /// Defaults overridden by the usual environment variables
    ///
    /// Reads `PG_AUTOCTL`, `PG_CTL`, `PSQL`, `PGVERSION`,
    /// `PG_REGRESS_SOCK_DIR`, `USER` and `HOME`. Call `dotenv` before this
    /// to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a JSON configuration file, then apply environment overrides
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: HarnessConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(path) = var("PG_AUTOCTL") {
            self.pg_autoctl = PathBuf::from(path);
        }
        if let Some(path) = var("PG_CTL") {
            self.pg_ctl = PathBuf::from(path);
        }
        if let Some(path) = var("PSQL") {
            self.psql = PathBuf::from(path);
        }
        if let Some(version) = var("PGVERSION") {
            self.pg_version = version;
        }
        if let Some(dir) = var("PG_REGRESS_SOCK_DIR") {
            self.socket_dir = Some(PathBuf::from(dir));
        }
        if let Some(user) = var("USER") {
            self.username = user;
        }
        if let Some(home) = var("HOME") {
            self.home = PathBuf::from(home);
        }
        self
    }

    /// Reject values that would make every wait meaningless
    pub fn validate(&self) -> HarnessResult<()> {
        let positive = [
            ("command_timeout_secs", self.command_timeout_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("state_change_timeout_secs", self.state_change_timeout_secs),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(HarnessError::config(format!("{field} must be positive, got {value}")));
            }
        }
        if self.termination_attempts == 0 {
            return Err(HarnessError::config("termination_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Falls back to the default for a value that is not a valid duration
    pub fn command_timeout(&self) -> Duration {
        secs_or_default(self.command_timeout_secs, COMMAND_TIMEOUT_SECS)
    }

    pub fn poll_interval(&self) -> Duration {
        secs_or_default(self.poll_interval_secs, POLLING_INTERVAL_SECS)
    }

    pub fn state_change_timeout(&self) -> Duration {
        secs_or_default(self.state_change_timeout_secs, STATE_CHANGE_TIMEOUT_SECS)
    }

    /// Environment every child process is started with
    pub fn child_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("PGHOST".to_string(), self.pghost.clone()),
            (
                "PG_REGRESS_SOCK_DIR".to_string(),
                self.socket_dir
                    .as_ref()
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_default(),
            ),
        ];
        if self.autoctl_debug {
            env.push(("PG_AUTOCTL_DEBUG".to_string(), "1".to_string()));
        }
        env
    }
}

/// Fields set directly skip `validate`, so negative, NaN and zero values
/// can reach this point
fn secs_or_default(secs: f64, default: f64) -> Duration {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => Duration::from_secs_f64(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_timings() {
        let config = HarnessConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.state_change_timeout(), Duration::from_secs(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_child_env() {
        let config = HarnessConfig::default();
        let env = config.child_env();
        assert!(env.contains(&("PGHOST".to_string(), "localhost".to_string())));
        assert!(env.contains(&("PG_REGRESS_SOCK_DIR".to_string(), String::new())));
        assert!(env.iter().any(|(k, _)| k == "PG_AUTOCTL_DEBUG"));

        let quiet = HarnessConfig {
            autoctl_debug: false,
            socket_dir: Some(PathBuf::from("/tmp/sock")),
            ..HarnessConfig::default()
        };
        let env = quiet.child_env();
        assert!(!env.iter().any(|(k, _)| k == "PG_AUTOCTL_DEBUG"));
        assert!(env.contains(&("PG_REGRESS_SOCK_DIR".to_string(), "/tmp/sock".to_string())));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{ "pg_autoctl": "/usr/lib/postgresql/11/bin/pg_autoctl", "poll_interval_secs": 0.5 }"#)
                .unwrap();
        assert_eq!(config.pg_autoctl, PathBuf::from("/usr/lib/postgresql/11/bin/pg_autoctl"));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.command_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let config = HarnessConfig {
            command_timeout_secs: 0.0,
            ..HarnessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarnessError::ConfigurationError { .. })
        ));

        let config = HarnessConfig {
            termination_attempts: 0,
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_durations_fall_back_to_defaults() {
        let config = HarnessConfig {
            command_timeout_secs: -1.0,
            poll_interval_secs: f64::NAN,
            state_change_timeout_secs: 0.0,
            ..HarnessConfig::default()
        };
        assert_eq!(config.command_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.state_change_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{ "state_change_timeout_secs": 30, "termination_attempts": 5 }"#).unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.state_change_timeout(), Duration::from_secs(30));
        assert_eq!(config.termination_attempts, 5);
    }
}
