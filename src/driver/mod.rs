//! Wire driver boundary
//!
//! Everything that touches the network goes through these traits:
//! - [`WireDriver`] establishes a connection for a topology
//! - [`WireConnection`] runs commands and opens server-side cursors
//! - [`WireCursor`] streams documents out of one server-side cursor
//!
//! [`MongoDriver`] implements them on top of the official `mongodb` crate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;

use crate::config::{ConnectionConfig, Credentials, Topology};
use crate::error::Result;

mod mongo;

#[cfg(test)]
pub(crate) mod mock;

pub use mongo::MongoDriver;

/// A live connection shared by every handle derived from one database
pub type Connection = Arc<dyn WireConnection>;

/// Everything the driver needs to open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    /// Single server or replica set
    pub topology: Topology,

    /// Credentials to authenticate with after connecting
    pub credentials: Option<Credentials>,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Interval between reconnection probes
    pub reconnect_interval: Duration,

    /// Application name reported to the server
    pub app_name: Option<String>,
}

impl From<&ConnectionConfig> for ConnectSettings {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            topology: config.topology(),
            credentials: config.credentials(),
            connect_timeout: config.connect_timeout(),
            reconnect_interval: config.reconnect_interval(),
            app_name: config.app_name.clone(),
        }
    }
}

/// Opens connections
#[async_trait]
pub trait WireDriver: Send + Sync {
    /// Connect (and authenticate, when credentials are given).
    ///
    /// Resolves only once the connection is usable.
    async fn connect(&self, settings: &ConnectSettings) -> Result<Connection>;
}

/// One established connection
#[async_trait]
pub trait WireConnection: Send + Sync {
    /// Run a command against `database` and return the reply document
    async fn command(&self, database: &str, command: Document) -> Result<Document>;

    /// Run a cursor-producing command (`find`, `aggregate`, `listIndexes`, ...)
    async fn open_cursor(&self, database: &str, command: Document) -> Result<Box<dyn WireCursor>>;

    /// Release the transport
    async fn close(&self) -> Result<()>;
}

/// One server-side cursor
#[async_trait]
pub trait WireCursor: Send {
    /// Fetch the next document, or `None` at end of data
    async fn fetch_next(&mut self) -> Result<Option<Document>>;

    /// Release the server-side cursor
    async fn close(&mut self) -> Result<()>;
}
