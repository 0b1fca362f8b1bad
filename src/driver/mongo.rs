//! `mongodb`-backed wire driver

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::{Client, Cursor};
use tracing::{debug, info};

use super::{ConnectSettings, Connection, WireConnection, WireCursor, WireDriver};
use crate::config::Topology;
use crate::error::{ConnectionError, Result};

/// The driver refuses heartbeat intervals shorter than this
const MIN_HEARTBEAT: Duration = Duration::from_millis(500);

/// Wire driver backed by the official MongoDB driver
#[derive(Debug, Default, Clone)]
pub struct MongoDriver;

impl MongoDriver {
    /// Create a new driver
    pub fn new() -> Self {
        Self
    }

    /// Build client options for the given settings
    fn client_options(settings: &ConnectSettings) -> Result<ClientOptions> {
        let hosts: Vec<ServerAddress> = settings
            .topology
            .members()
            .into_iter()
            .map(|member| ServerAddress::Tcp {
                host: member.host.clone(),
                port: Some(member.port),
            })
            .collect();

        if hosts.is_empty() {
            return Err(ConnectionError::InvalidTopology("no hosts configured".to_string()).into());
        }

        let mut options = ClientOptions::default();
        options.hosts = hosts;
        options.app_name = settings.app_name.clone();
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.connect_timeout);
        options.heartbeat_freq = Some(settings.reconnect_interval.max(MIN_HEARTBEAT));

        match &settings.topology {
            Topology::Single(_) => {
                options.direct_connection = Some(true);
            }
            Topology::ReplicaSet { name, .. } => {
                options.repl_set_name = name.clone();
            }
        }

        if let Some(creds) = &settings.credentials {
            options.credential = Some(
                Credential::builder()
                    .username(creds.username.clone())
                    .password(creds.password.clone())
                    .source(creds.source.clone())
                    .build(),
            );
        }

        Ok(options)
    }
}

#[async_trait]
impl WireDriver for MongoDriver {
    async fn connect(&self, settings: &ConnectSettings) -> Result<Connection> {
        let options = Self::client_options(settings)?;
        let client = Client::with_options(options)?;

        // The client connects lazily; a ping forces the handshake and,
        // when credentials are set, authentication.
        let ping_db = settings
            .credentials
            .as_ref()
            .map(|c| c.source.as_str())
            .unwrap_or("admin");
        client.database(ping_db).run_command(doc! { "ping": 1 }).await?;

        info!(
            members = settings.topology.members().len(),
            authenticated = settings.credentials.is_some(),
            "MongoDB connection established"
        );

        Ok(Arc::new(MongoConnection { client }))
    }
}

/// Connection over a `mongodb::Client`
struct MongoConnection {
    client: Client,
}

#[async_trait]
impl WireConnection for MongoConnection {
    async fn command(&self, database: &str, command: Document) -> Result<Document> {
        let reply = self.client.database(database).run_command(command).await?;
        Ok(reply)
    }

    async fn open_cursor(&self, database: &str, command: Document) -> Result<Box<dyn WireCursor>> {
        let cursor = self
            .client
            .database(database)
            .run_cursor_command(command)
            .await?;
        Ok(Box::new(MongoCursor {
            cursor: Some(cursor),
        }))
    }

    async fn close(&self) -> Result<()> {
        debug!("Shutting down MongoDB client");
        self.client.clone().shutdown().immediate(true).await;
        Ok(())
    }
}

/// Server-side cursor held through the driver
struct MongoCursor {
    cursor: Option<Cursor<Document>>,
}

#[async_trait]
impl WireCursor for MongoCursor {
    async fn fetch_next(&mut self) -> Result<Option<Document>> {
        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor.try_next().await?),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the driver cursor kills it on the server.
        self.cursor = None;
        Ok(())
    }
}
