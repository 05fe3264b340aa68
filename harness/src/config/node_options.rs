//! Per-node creation options
//!
//! Options for `Cluster::create_monitor` and `Cluster::create_datanode`.

use serde::{Deserialize, Serialize};
use shared::{Role, SslMode};
use std::path::PathBuf;

/// TLS settings shared by monitors and data nodes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    pub ssl_mode: Option<SslMode>,
    pub self_signed: bool,
    pub ca_file: Option<PathBuf>,
    pub server_key: Option<PathBuf>,
    pub server_cert: Option<PathBuf>,
}

impl TlsOptions {
    pub fn self_signed() -> Self {
        Self {
            self_signed: true,
            ..Self::default()
        }
    }

    pub fn with_ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = Some(mode);
        self
    }

    /// Arguments appended to `pg_autoctl create`
    ///
    /// `--no-ssl` is passed unless a self-signed certificate or a CA file is
    /// in use.
    pub fn create_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(mode) = self.ssl_mode {
            args.push("--ssl-mode".to_string());
            args.push(mode.to_string());
        }
        if self.self_signed {
            args.push("--ssl-self-signed".to_string());
        }
        if let Some(ref ca_file) = self.ca_file {
            args.push("--ssl-ca-file".to_string());
            args.push(ca_file.display().to_string());
        }
        if let Some(ref key) = self.server_key {
            args.push("--server-key".to_string());
            args.push(key.display().to_string());
        }
        if let Some(ref cert) = self.server_cert {
            args.push("--server-cert".to_string());
            args.push(cert.display().to_string());
        }
        if !self.self_signed && self.ca_file.is_none() {
            args.push("--no-ssl".to_string());
        }

        args
    }
}

/// Options for the monitor node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOptions {
    pub datadir: PathBuf,
    pub port: u16,
    /// Defaults to the node's network address
    pub nodename: Option<String>,
    pub auth_method: Option<String>,
    pub tls: TlsOptions,
}

impl MonitorOptions {
    pub fn new<P: Into<PathBuf>>(datadir: P) -> Self {
        Self {
            datadir: datadir.into(),
            port: 5432,
            nodename: None,
            auth_method: None,
            tls: TlsOptions::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn nodename<S: Into<String>>(mut self, nodename: S) -> Self {
        self.nodename = Some(nodename.into());
        self
    }

    pub fn auth_method<S: Into<String>>(mut self, method: S) -> Self {
        self.auth_method = Some(method.into());
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }
}

/// Options for a data node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNodeOptions {
    pub datadir: PathBuf,
    pub port: u16,
    pub group: u32,
    /// Pass `--listen <address>` and use the node address as `--pghost`
    pub listen: bool,
    pub role: Role,
    pub formation: Option<String>,
    pub auth_method: Option<String>,
    pub tls: TlsOptions,
}

impl DataNodeOptions {
    pub fn new<P: Into<PathBuf>>(datadir: P) -> Self {
        Self {
            datadir: datadir.into(),
            port: 5432,
            group: 0,
            listen: false,
            role: Role::Postgres,
            formation: None,
            auth_method: None,
            tls: TlsOptions::default(),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn listen(mut self, listen: bool) -> Self {
        self.listen = listen;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn formation<S: Into<String>>(mut self, formation: S) -> Self {
        self.formation = Some(formation.into());
        self
    }

    pub fn auth_method<S: Into<String>>(mut self, method: S) -> Self {
        self.auth_method = Some(method.into());
        self
    }

    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }
}
