//! Harness Configuration Builder
//!
//! Provides a fluent builder for constructing harness configurations

use super::HarnessConfig;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::HarnessResult;

pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Set the `pg_autoctl` binary
    pub fn pg_autoctl<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.pg_autoctl = path.into();
        self
    }

    /// Set the `pg_ctl` binary
    pub fn pg_ctl<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.pg_ctl = path.into();
        self
    }

    /// Set the `psql` binary
    pub fn psql<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.psql = path.into();
        self
    }

    pub fn pg_version<S: Into<String>>(mut self, version: S) -> Self {
        self.config.pg_version = version.into();
        self
    }

    pub fn pghost<S: Into<String>>(mut self, host: S) -> Self {
        self.config.pghost = host.into();
        self
    }

    pub fn socket_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.socket_dir = Some(dir.into());
        self
    }

    pub fn autoctl_debug(mut self, enabled: bool) -> Self {
        self.config.autoctl_debug = enabled;
        self
    }

    pub fn username<S: Into<String>>(mut self, user: S) -> Self {
        self.config.username = user.into();
        self
    }

    /// Set the home directory holding `pg_autoctl` config and state files
    pub fn home<P: Into<PathBuf>>(mut self, home: P) -> Self {
        self.config.home = home.into();
        self
    }

    pub fn network_base(mut self, base: Ipv4Addr) -> Self {
        self.config.network_base = base;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_secs = interval.as_secs_f64();
        self
    }

    pub fn state_change_timeout(mut self, timeout: Duration) -> Self {
        self.config.state_change_timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn termination_attempts(mut self, attempts: u32) -> Self {
        self.config.termination_attempts = attempts;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarnessResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = HarnessConfig::builder()
            .pg_autoctl("/opt/pg/bin/pg_autoctl")
            .home("/tmp/harness-home")
            .command_timeout(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(250))
            .termination_attempts(2)
            .build()
            .unwrap();

        assert_eq!(config.pg_autoctl, PathBuf::from("/opt/pg/bin/pg_autoctl"));
        assert_eq!(config.home, PathBuf::from("/tmp/harness-home"));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.termination_attempts, 2);
    }

    #[test]
    fn test_builder_validates() {
        let result = HarnessConfig::builder().poll_interval(Duration::ZERO).build();
        assert!(result.is_err());
    }
}
