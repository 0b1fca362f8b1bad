//! Connection management for MongoDB
//!
//! This module provides the lazily-established, memoized connection shared by
//! every collection, cursor and bulk operation derived from one database:
//! - At most one connection attempt is in flight at any time; concurrent
//!   callers attach to it and receive the same connection or the same error
//! - A failed attempt is never cached; the next call starts from scratch
//! - `close()` releases the transport only if one was established
//! - `Ready` / `Error` / `Closed` notifications through a broadcast channel

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::driver::{ConnectSettings, Connection, WireDriver};
use crate::error::{MongoshError, Result};

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 16;

type PendingConnect = Shared<BoxFuture<'static, Result<Connection>>>;

/// Connection state information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected
    Unconnected,

    /// An attempt is in flight
    Connecting,

    /// Connected and ready
    Connected,

    /// The last attempt failed; the next `connect()` retries
    Failed(String),

    /// Explicitly closed; the next `connect()` re-establishes
    Closed,
}

/// Notifications emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection was established
    Ready,

    /// An operation on the established connection hit a transport error
    Error(MongoshError),

    /// The connection was released by `close()`
    Closed,
}

/// Memo cell
enum Slot {
    Idle(ConnectionState),
    Pending { attempt: u64, future: PendingConnect },
    Ready(Connection),
}

struct Inner {
    driver: Arc<dyn WireDriver>,
    settings: ConnectSettings,
    slot: Mutex<Slot>,
    attempts: AtomicU64,
    events: broadcast::Sender<ConnectionEvent>,
}

/// MongoDB connection manager
///
/// Cheap to clone; every clone shares the same memoized connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// Nothing touches the network until the first `connect()`.
    pub fn new(driver: Arc<dyn WireDriver>, settings: ConnectSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                driver,
                settings,
                slot: Mutex::new(Slot::Idle(ConnectionState::Unconnected)),
                attempts: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Get the connection, establishing it on first use
    ///
    /// # Returns
    /// * `Result<Connection>` - The shared connection or the error of the
    ///   attempt this call attached to
    pub async fn connect(&self) -> Result<Connection> {
        let future = {
            let mut slot = self.inner.slot.lock().await;
            match &*slot {
                Slot::Ready(conn) => return Ok(conn.clone()),
                Slot::Pending { future, .. } => future.clone(),
                Slot::Idle(_) => {
                    let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = Self::establish(self.inner.clone(), attempt)
                        .boxed()
                        .shared();
                    *slot = Slot::Pending {
                        attempt,
                        future: future.clone(),
                    };
                    future
                }
            }
        };

        future.await
    }

    /// Run one connection attempt and record its outcome in the memo
    async fn establish(inner: Arc<Inner>, attempt: u64) -> Result<Connection> {
        info!(
            attempt,
            members = inner.settings.topology.members().len(),
            "Connecting to MongoDB"
        );

        let result = inner.driver.connect(&inner.settings).await;

        let mut slot = inner.slot.lock().await;
        let current = matches!(&*slot, Slot::Pending { attempt: a, .. } if *a == attempt);

        match &result {
            Ok(conn) => {
                if current {
                    *slot = Slot::Ready(conn.clone());
                }
                let _ = inner.events.send(ConnectionEvent::Ready);
                info!(attempt, "Connection ready");
            }
            Err(e) => {
                if current {
                    *slot = Slot::Idle(ConnectionState::Failed(e.to_string()));
                }
                warn!(attempt, error = %e, "Connection attempt failed");
            }
        }

        result
    }

    /// Release the connection, if one was established
    ///
    /// An attempt in flight is awaited first. Afterwards the memo is reset
    /// so a later `connect()` re-establishes.
    pub async fn close(&self) -> Result<()> {
        let pending = {
            let slot = self.inner.slot.lock().await;
            match &*slot {
                Slot::Pending { future, .. } => Some(future.clone()),
                _ => None,
            }
        };

        if let Some(future) = pending {
            debug!("Waiting for in-flight connection attempt before closing");
            let _ = future.await;
        }

        let established = {
            let mut slot = self.inner.slot.lock().await;
            match &*slot {
                Slot::Ready(conn) => {
                    let conn = conn.clone();
                    *slot = Slot::Idle(ConnectionState::Closed);
                    Some(conn)
                }
                _ => None,
            }
        };

        match established {
            Some(conn) => {
                conn.close().await?;
                let _ = self.inner.events.send(ConnectionEvent::Closed);
                info!("Connection closed");
            }
            None => debug!("close() without an established connection"),
        }

        Ok(())
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        match &*self.inner.slot.lock().await {
            Slot::Idle(state) => state.clone(),
            Slot::Pending { .. } => ConnectionState::Connecting,
            Slot::Ready(_) => ConnectionState::Connected,
        }
    }

    /// Check if currently connected
    pub async fn is_connected(&self) -> bool {
        matches!(self.state().await, ConnectionState::Connected)
    }

    /// Subscribe to connection notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Report an operation failure; transport errors are broadcast to
    /// listeners
    ///
    /// The memo is kept: the driver's own monitoring re-establishes the
    /// transport.
    pub(crate) fn report(&self, err: &MongoshError) {
        if err.is_transport() {
            warn!(error = %err, "Transport error on established connection");
            let _ = self.inner.events.send(ConnectionEvent::Error(err.clone()));
        }
    }

    /// Connection settings this manager was created with
    pub fn settings(&self) -> &ConnectSettings {
        &self.inner.settings
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("settings", &self.inner.settings)
            .field("attempts", &self.inner.attempts.load(Ordering::SeqCst))
            .finish()
    }
}
