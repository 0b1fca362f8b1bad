//! Database handles
//!
//! A [`Database`] is the root object of the client: it owns the connection
//! manager, the default write concern and the registered collection names.
//! Handles are cheap to clone and every clone, collection, cursor and bulk
//! operation derived from one shares the same connection.

mod accessors;

use std::fmt;
use std::sync::Arc;

use bson::{Bson, Document, doc};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::collection::Collection;
use crate::config::{Config, WriteConcernConfig};
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::cursor::{CommandDescriptor, Cursor};
use crate::driver::{ConnectSettings, Connection, MongoDriver, WireDriver};
use crate::error::{MongoshError, Result};
use crate::utils::document::{check_reply, command_name, merge};

pub use accessors::CollectionNode;
use accessors::NameTree;

struct DatabaseInner {
    name: String,
    write_concern: WriteConcernConfig,
    manager: ConnectionManager,
    accessors: NameTree,
}

/// Handle on one database
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Create a database handle over the given driver
    ///
    /// Nothing is sent to the server until the first command. The collection
    /// names listed in `config.connection.collections` become accessors.
    ///
    /// # Arguments
    /// * `config` - Client configuration
    /// * `driver` - Wire driver used to open the connection
    pub fn new(config: &Config, driver: Arc<dyn WireDriver>) -> Self {
        let settings = ConnectSettings::from(&config.connection);
        let mut accessors = NameTree::default();
        for name in &config.connection.collections {
            accessors.insert(name);
        }

        debug!(
            database = %config.connection.database,
            collections = config.connection.collections.len(),
            "Database handle created"
        );

        Self {
            inner: Arc::new(DatabaseInner {
                name: config.connection.database.clone(),
                write_concern: config.write_concern.clone(),
                manager: ConnectionManager::new(driver, settings),
                accessors,
            }),
        }
    }

    /// Create a database handle backed by the MongoDB driver
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, Arc::new(MongoDriver::new()))
    }

    /// Register more collection names as accessors
    ///
    /// The returned handle shares this handle's connection.
    pub fn with_collections<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut accessors = self.inner.accessors.clone();
        for name in names {
            accessors.insert(name.as_ref());
        }

        Self {
            inner: Arc::new(DatabaseInner {
                name: self.inner.name.clone(),
                write_concern: self.inner.write_concern.clone(),
                manager: self.inner.manager.clone(),
                accessors,
            }),
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Default write concern attached to every write
    pub fn write_concern(&self) -> &WriteConcernConfig {
        &self.inner.write_concern
    }

    /// Get a collection by name
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(self.clone(), name)
    }

    /// Look up a registered accessor; dotted paths walk nested nodes
    pub fn accessor(&self, path: &str) -> Option<CollectionNode<'_>> {
        CollectionNode::resolve(self, &self.inner.accessors, path)
    }

    /// Force the connection open
    pub async fn open(&self) -> Result<()> {
        self.connection().await.map(|_| ())
    }

    /// The shared connection, established on first use
    pub(crate) async fn connection(&self) -> Result<Connection> {
        self.inner.manager.connect().await
    }

    /// Forward an operation failure to the connection manager
    pub(crate) fn report(&self, err: &MongoshError) {
        self.inner.manager.report(err);
    }

    /// Run a command against this database
    ///
    /// `ok: 0` replies become [`crate::error::CommandError`]s. A `shutdown`
    /// command closes the handle once the server has answered.
    ///
    /// # Arguments
    /// * `command` - The command document
    ///
    /// # Returns
    /// * `Result<Document>` - The server reply
    pub async fn run_command(&self, command: Document) -> Result<Document> {
        let name = command_name(&command).to_string();
        let conn = self.connection().await?;

        debug!(database = %self.name(), command = %name, "Running command");
        let reply = conn
            .command(self.name(), command)
            .await
            .and_then(check_reply)
            .inspect_err(|e| self.report(e));

        if name == "shutdown" {
            info!(database = %self.name(), "Server shutdown requested; closing handle");
            self.close().await?;
        }

        reply
    }

    /// Run `{<name>: 1}`
    pub async fn run_named_command(&self, name: &str) -> Result<Document> {
        let mut command = Document::new();
        command.insert(name, 1);
        self.run_command(command).await
    }

    /// Cursor over a cursor-producing command
    ///
    /// # Arguments
    /// * `name` - Command name
    /// * `command` - Full command document; defaults to `{<name>: 1}`
    pub fn run_command_cursor(&self, name: &str, command: Option<Document>) -> Cursor {
        let command = command.unwrap_or_else(|| {
            let mut command = Document::new();
            command.insert(name, 1);
            command
        });
        Cursor::new(self.clone(), CommandDescriptor::raw(command))
    }

    /// Create a collection explicitly
    pub async fn create_collection(&self, name: &str, options: Option<Document>) -> Result<Document> {
        let mut command = doc! { "create": name };
        merge(&mut command, options.unwrap_or_default());
        self.run_command(command).await
    }

    /// Drop this database
    pub async fn drop_database(&self) -> Result<Document> {
        self.run_named_command("dropDatabase").await
    }

    /// Create a user
    ///
    /// # Arguments
    /// * `user` - User descriptor; must carry a `user` name, every other
    ///   field (`pwd`, `roles`, ...) is passed through
    pub async fn create_user(&self, mut user: Document) -> Result<Document> {
        let name = match user.remove("user") {
            Some(Bson::String(name)) => name,
            _ => {
                return Err(MongoshError::invalid_parameters(
                    "user descriptor must carry a string `user` field",
                ));
            }
        };

        let mut command = doc! { "createUser": name };
        merge(&mut command, user);
        self.run_command(command).await
    }

    /// Alias of [`Database::create_user`]
    pub async fn add_user(&self, user: Document) -> Result<Document> {
        self.create_user(user).await
    }

    /// Drop a user
    pub async fn drop_user(&self, username: &str) -> Result<Document> {
        self.run_command(doc! { "dropUser": username }).await
    }

    /// Alias of [`Database::drop_user`]
    pub async fn remove_user(&self, username: &str) -> Result<Document> {
        self.drop_user(username).await
    }

    /// Names of the collections in this database
    ///
    /// Names containing `$` are internal and left out.
    pub async fn get_collection_names(&self) -> Result<Vec<String>> {
        let cursor = self.run_command_cursor(
            "listCollections",
            Some(doc! { "listCollections": 1, "nameOnly": true }),
        );

        let names = cursor
            .map(|entry| entry.get_str("name").map(str::to_string).ok())
            .await?;

        Ok(names
            .into_iter()
            .flatten()
            .filter(|name| !name.contains('$'))
            .collect())
    }

    /// Database statistics
    ///
    /// # Arguments
    /// * `scale` - Divisor for byte counts (defaults to 1)
    pub async fn stats(&self, scale: Option<i32>) -> Result<Document> {
        self.run_command(doc! { "dbStats": 1, "scale": scale.unwrap_or(1) })
            .await
    }

    /// Release the connection if one was established
    pub async fn close(&self) -> Result<()> {
        self.inner.manager.close().await
    }

    /// Subscribe to connection notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.manager.subscribe()
    }

    /// Current connection state
    pub async fn state(&self) -> ConnectionState {
        self.inner.manager.state().await
    }

    /// Handle over a mock driver
    #[cfg(test)]
    pub(crate) fn for_test(driver: &crate::driver::mock::MockDriver) -> Self {
        let mut config = Config::default();
        config.connection.database = "test".to_string();
        Self::new(&config, Arc::new(driver.clone()))
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.name)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.inner.name)
            .field("write_concern", &self.inner.write_concern)
            .field("manager", &self.inner.manager)
            .finish()
    }
}
