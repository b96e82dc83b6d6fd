//! Connection and TLS configuration. Generalized from
//! `conn::connection_options::ConnectionOptions`, which mixed connect
//! parameters with CDC-only fields (`binlog`, `server_id`, `heartbeat_interval`).
//! Those drop out here; `SslOpts`/`ClientIdentity` carry over almost verbatim
//! since they're already protocol-agnostic.

use std::path::{Path, PathBuf};
use std::time::Duration;

use native_tls::Identity;
use serde::{Deserialize, Serialize};

use common::err::decode_error::ReError;
use common::err::CResult;

/// How strongly the client insists on TLS, ordered from least to most strict
/// so `ssl_mode >= SslMode::Require` reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SslMode {
    Disabled,
    Preferred,
    Require,
    VerifyCa,
    VerifyIdentity,
}

/// Parameters needed to open and authenticate a connection. Analogous to
/// `ConnectionOptions`, minus the binlog-streaming fields that belonged to a
/// CDC-only client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    /// Initial connection-level character set (collation id); applied via
    /// `SET NAMES` semantics during the handshake.
    pub collation: u8,
    pub ssl_mode: SslMode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssl_opts: Option<SslOpts>,
    #[serde(with = "humantime_duration", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    pub multi_statements: bool,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

mod humantime_duration {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        ConnectConfig {
            host: String::from("localhost"),
            port: 3306,
            username: String::new(),
            password: String::new(),
            database: None,
            collation: crate::UTF8_MB4_GENERAL_CI,
            ssl_mode: SslMode::Preferred,
            ssl_opts: None,
            connect_timeout: default_connect_timeout(),
            multi_statements: true,
        }
    }
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>, password: impl Into<String>) -> Self {
        ConnectConfig {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ..ConnectConfig::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }
}

/// TLS client-identity and verification options, only consulted once
/// `ssl_mode` requests an upgrade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SslOpts {
    client_identity: Option<ClientIdentity>,
    root_cert_path: Option<PathBuf>,
    skip_domain_validation: bool,
    accept_invalid_certs: bool,
}

impl SslOpts {
    pub fn with_client_identity(mut self, identity: Option<ClientIdentity>) -> Self {
        self.client_identity = identity;
        self
    }

    pub fn with_root_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.root_cert_path = path;
        self
    }

    pub fn with_danger_skip_domain_validation(mut self, value: bool) -> Self {
        self.skip_domain_validation = value;
        self
    }

    pub fn with_danger_accept_invalid_certs(mut self, value: bool) -> Self {
        self.accept_invalid_certs = value;
        self
    }

    pub fn client_identity(&self) -> Option<&ClientIdentity> {
        self.client_identity.as_ref()
    }

    pub fn root_cert_path(&self) -> Option<&Path> {
        self.root_cert_path.as_deref()
    }

    pub fn skip_domain_validation(&self) -> bool {
        self.skip_domain_validation
    }

    pub fn accept_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    pkcs12_path: PathBuf,
    password: Option<String>,
}

impl ClientIdentity {
    pub fn new(pkcs12_path: impl Into<PathBuf>) -> Self {
        Self { pkcs12_path: pkcs12_path.into(), password: None }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub(crate) fn load(&self) -> CResult<Identity> {
        let der = std::fs::read(&self.pkcs12_path)?;
        match Identity::from_pkcs12(&der, self.password.as_deref().unwrap_or("")) {
            Ok(identity) => Ok(identity),
            Err(err) => Err(ReError::Tls(format!("failed to load client identity: {err}"))),
        }
    }
}
