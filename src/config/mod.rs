//! Configuration management for mongosh-client
//!
//! This module handles loading, parsing, and managing configuration:
//! - Configuration files (TOML format)
//! - The `MONGOSH_CLIENT_CONFIG` environment variable naming that file
//! - Default values
//!
//! The configuration is threaded explicitly into every database handle,
//! collection and bulk operation; there is no process-wide default.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable that points at a configuration file
pub const CONFIG_ENV_VAR: &str = "MONGOSH_CLIENT_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Default write concern for every write issued through the client
    #[serde(default)]
    pub write_concern: WriteConcernConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server addresses; one entry means a direct connection,
    /// several mean a replica set
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,

    /// Database name
    #[serde(default = "default_database")]
    pub database: String,

    /// Replica set name
    #[serde(default)]
    pub replica_set: Option<String>,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Database to authenticate against (defaults to `database`)
    #[serde(default)]
    pub auth_source: Option<String>,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Interval between reconnection probes in milliseconds
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// Application name reported to the server
    #[serde(default)]
    pub app_name: Option<String>,

    /// Collection names exposed as named accessors
    #[serde(default)]
    pub collections: Vec<String>,
}

/// One server address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host name
    #[serde(default = "default_host")]
    pub host: String,

    /// Port number
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Write acknowledgment level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Acknowledgment {
    /// Number of nodes
    Nodes(u32),

    /// Tag set name, e.g. `majority`
    Tag(String),
}

/// Write concern configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcernConfig {
    /// Acknowledgment level
    #[serde(default)]
    pub w: Option<Acknowledgment>,

    /// Wait for the journal commit
    #[serde(default)]
    pub j: Option<bool>,

    /// Wait for the data files to be flushed
    #[serde(default)]
    pub fsync: Option<bool>,

    /// Acknowledgment timeout in milliseconds
    #[serde(default)]
    pub wtimeout: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Connection topology derived from the configured hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// A single server, connected directly
    Single(HostConfig),

    /// A replica set discovered from its seed members
    ReplicaSet {
        /// Replica set name, if known
        name: Option<String>,
        /// Seed members
        members: Vec<HostConfig>,
    },
}

/// Credentials used to authenticate right after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub source: String,
}

// Default value functions
fn default_hosts() -> Vec<HostConfig> {
    vec![HostConfig::default()]
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    27017
}

fn default_database() -> String {
    "test".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_interval_ms() -> u64 {
    500
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            database: default_database(),
            replica_set: None,
            username: None,
            password: None,
            auth_source: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            app_name: None,
            collections: Vec::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for WriteConcernConfig {
    fn default() -> Self {
        Self {
            w: Some(Acknowledgment::Nodes(1)),
            j: None,
            fsync: None,
            wtimeout: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the file named by `MONGOSH_CLIENT_CONFIG`,
    /// then the default path, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(path);
        }

        let path = Self::default_path();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongosh")
            .join("client.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;

        if conn.hosts.is_empty() {
            return Err(ConfigError::MissingField("connection.hosts".to_string()).into());
        }

        if let Some(bad) = conn.hosts.iter().find(|h| h.host.is_empty() || h.port == 0) {
            return Err(ConfigError::InvalidValue {
                field: "connection.hosts".to_string(),
                value: format!("{}:{}", bad.host, bad.port),
            }
            .into());
        }

        if conn.database.is_empty() {
            return Err(ConfigError::MissingField("connection.database".to_string()).into());
        }

        if conn.password.is_some() && conn.username.is_none() {
            return Err(ConfigError::MissingField("connection.username".to_string()).into());
        }

        Ok(())
    }
}

impl ConnectionConfig {
    /// Configuration for a single database on one host
    pub fn new(host: impl Into<String>, port: u16, database: impl Into<String>) -> Self {
        Self {
            hosts: vec![HostConfig {
                host: host.into(),
                port,
            }],
            database: database.into(),
            ..Self::default()
        }
    }

    /// Derive the topology from the configured hosts
    pub fn topology(&self) -> Topology {
        match self.hosts.as_slice() {
            [single] => Topology::Single(single.clone()),
            members => Topology::ReplicaSet {
                name: self.replica_set.clone(),
                members: members.to_vec(),
            },
        }
    }

    /// Derive credentials, if a username is configured
    pub fn credentials(&self) -> Option<Credentials> {
        self.username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.password.clone().unwrap_or_default(),
            source: self
                .auth_source
                .clone()
                .unwrap_or_else(|| self.database.clone()),
        })
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get reconnect interval as Duration
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl Topology {
    /// All configured members, in order
    pub fn members(&self) -> Vec<&HostConfig> {
        match self {
            Topology::Single(host) => vec![host],
            Topology::ReplicaSet { members, .. } => members.iter().collect(),
        }
    }
}

impl std::fmt::Display for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl WriteConcernConfig {
    /// Render as the `writeConcern` sub-document of a write command.
    ///
    /// A missing `w` falls back to 1.
    pub fn to_document(&self) -> Document {
        let w = match &self.w {
            Some(Acknowledgment::Nodes(n)) => Bson::Int32(*n as i32),
            Some(Acknowledgment::Tag(tag)) => Bson::String(tag.clone()),
            None => Bson::Int32(1),
        };

        let mut wc = doc! { "w": w };
        if let Some(j) = self.j {
            wc.insert("j", j);
        }
        if let Some(fsync) = self.fsync {
            wc.insert("fsync", fsync);
        }
        if let Some(wtimeout) = self.wtimeout {
            wc.insert("wtimeout", wtimeout as i64);
        }
        wc
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MongoshError;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.hosts, vec![HostConfig::default()]);
        assert_eq!(config.connection.database, "test");
        assert_eq!(config.write_concern.to_document(), doc! { "w": 1 });
        assert_eq!(config.logging.level, LogLevel::Warn);
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(
            r#"
            [connection]
            database = "shop"
            replica_set = "rs0"
            username = "admin"
            password = "secret"
            collections = ["orders", "audit.log"]
            hosts = [
                { host = "db1", port = 27017 },
                { host = "db2" },
            ]

            [write_concern]
            w = "majority"
            j = true
            wtimeout = 500

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.hosts[1].port, 27017);
        assert_eq!(config.connection.collections.len(), 2);
        assert_eq!(
            config.write_concern.to_document(),
            doc! { "w": "majority", "j": true, "wtimeout": 500i64 }
        );
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(matches!(
            config.connection.topology(),
            Topology::ReplicaSet { name: Some(ref n), ref members } if n == "rs0" && members.len() == 2
        ));

        let creds = config.connection.credentials().unwrap();
        assert_eq!(creds.source, "shop");
    }

    #[test]
    fn test_missing_w_defaults_to_one() {
        let config = Config::from_toml("[write_concern]\nj = true\n").unwrap();
        assert_eq!(config.write_concern.to_document(), doc! { "w": 1, "j": true });
    }

    #[test]
    fn test_single_host_topology() {
        let conn = ConnectionConfig::new("127.0.0.1", 27018, "app");
        assert_eq!(
            conn.topology(),
            Topology::Single(HostConfig {
                host: "127.0.0.1".into(),
                port: 27018
            })
        );
        assert!(conn.credentials().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.connection.hosts.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.connection.password = Some("pw".into());
        assert!(matches!(
            config.validate(),
            Err(MongoshError::Config(ConfigError::MissingField(_)))
        ));

        let err = Config::from_toml("[connection]\nhosts = [{ host = \"h\", port = 0 }]\n");
        assert!(matches!(
            err,
            Err(MongoshError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[connection\n").unwrap_err();
        assert!(matches!(err, MongoshError::Config(ConfigError::InvalidFormat(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, MongoshError::Config(ConfigError::FileNotFound(_))));
    }
}
