//! Shared fixtures for the harness integration tests
//!
//! Tests run against a fake `pg_autoctl` shell script instead of the real
//! binary, so they only need `sh`, `head`, `tr` and `sleep`.

#![allow(dead_code)]

use harness::{Cluster, HarnessConfig, MonitorNode, MonitorOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Bytes `pg_autoctl run` writes to stdout, more than one pipe buffer
pub const RUN_STDOUT_BYTES: usize = 100_000;

const FAKE_AUTOCTL: &str = r#"#!/bin/sh
case "$1" in
    run)
        head -c 100000 /dev/zero | tr '\0' 'x'
        echo "keeper finished writing" >&2
        exec sleep 30
        ;;
    config)
        if [ "$2" = "get" ]; then
            echo "value-of-$3"
            exit 0
        fi
        echo "config stdout"
        echo "config stderr" >&2
        exit 2
        ;;
    show)
        exec sleep 30
        ;;
    *)
        exit 0
        ;;
esac
"#;

pub struct TestFixtures {
    pub dir: TempDir,
    pub autoctl: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let autoctl = dir.path().join("pg_autoctl");
        std::fs::write(&autoctl, FAKE_AUTOCTL).expect("write fake pg_autoctl");
        std::fs::set_permissions(&autoctl, std::fs::Permissions::from_mode(0o755)).expect("chmod fake pg_autoctl");
        Self { dir, autoctl }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self, command_timeout: Duration) -> HarnessConfig {
        HarnessConfig::builder()
            .pg_autoctl(&self.autoctl)
            .home(self.path())
            .command_timeout(command_timeout)
            .termination_attempts(2)
            .build()
            .expect("valid config")
    }
}

pub struct TestHelpers;

impl TestHelpers {
    /// Cluster on the host network with its monitor already created
    pub async fn cluster_with_monitor(fixtures: &TestFixtures, command_timeout: Duration) -> (Cluster, MonitorNode) {
        let mut cluster = Cluster::with_host_network(fixtures.config(command_timeout));
        let monitor = cluster
            .create_monitor(MonitorOptions::new(fixtures.path().join("monitor")).port(5500))
            .await
            .expect("fake create monitor succeeds");
        (cluster, monitor)
    }
}
