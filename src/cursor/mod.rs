//! Lazy command cursors
//!
//! A [`Cursor`] wraps a deferred cursor-producing command:
//! - Nothing is sent until the first fetch, which connects (through the
//!   database's connection manager) and binds the server-side cursor
//! - Modifiers (`limit`, `skip`, `sort`, `batch_size`) only apply before binding
//! - Fetches on one cursor are serialized; `destroy()` cancels one in flight
//! - After exhaustion every fetch yields `None`; after `destroy()` every
//!   fetch fails with [`CursorError::Closed`]

pub mod descriptor;
mod stream;

use std::fmt;

use bson::Document;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::database::Database;
use crate::driver::WireCursor;
use crate::error::{CursorError, Result};
use crate::utils::document::get_u64;

pub use descriptor::{CommandDescriptor, CommandKind, CountRequest};

/// Where the cursor stands with respect to the server
enum Phase {
    /// Command not yet issued
    Unbound,

    /// Server-side cursor open
    Bound(Box<dyn WireCursor>),

    /// All documents delivered
    Exhausted,

    /// Destroyed by the caller
    Closed,
}

impl Phase {
    fn label(&self) -> &'static str {
        match self {
            Phase::Unbound => "unbound",
            Phase::Bound(_) => "bound",
            Phase::Exhausted => "exhausted",
            Phase::Closed => "closed",
        }
    }
}

/// A lazily-bound cursor over a cursor-producing command
pub struct Cursor {
    db: Database,
    descriptor: CommandDescriptor,
    phase: Mutex<Phase>,
    cancel: CancellationToken,
}

impl Cursor {
    /// Create an unbound cursor
    ///
    /// # Arguments
    /// * `db` - Database the command runs against
    /// * `descriptor` - The command to issue on first fetch
    pub fn new(db: Database, descriptor: CommandDescriptor) -> Self {
        Self {
            db,
            descriptor,
            phase: Mutex::new(Phase::Unbound),
            cancel: CancellationToken::new(),
        }
    }

    /// The command this cursor issues
    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    /// Namespace label, e.g. `test.users`
    pub fn namespace(&self) -> String {
        if self.descriptor.collection.is_empty() {
            format!("{}.$cmd", self.db.name())
        } else {
            format!("{}.{}", self.db.name(), self.descriptor.collection)
        }
    }

    /// Whether `destroy()` was called
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether modifiers can still change the command
    fn accepts_modifiers(&mut self, modifier: &str) -> bool {
        let phase = self.phase.get_mut();
        if matches!(phase, Phase::Unbound) {
            return true;
        }
        warn!(
            modifier,
            state = phase.label(),
            "Cursor already issued its command; modifier ignored"
        );
        false
    }

    /// Limit the number of returned documents
    pub fn limit(mut self, n: i64) -> Self {
        if self.accepts_modifiers("limit") {
            self.descriptor.limit = Some(n);
        }
        self
    }

    /// Skip documents
    pub fn skip(mut self, n: u64) -> Self {
        if self.accepts_modifiers("skip") {
            self.descriptor.skip = Some(n);
        }
        self
    }

    /// Sort the results
    pub fn sort(mut self, spec: Document) -> Self {
        if self.accepts_modifiers("sort") {
            self.descriptor.sort = Some(spec);
        }
        self
    }

    /// Documents per server batch
    pub fn batch_size(mut self, n: u32) -> Self {
        if self.accepts_modifiers("batchSize") {
            self.descriptor.batch_size = Some(n);
        }
        self
    }

    /// Fetch the next document
    ///
    /// The first call issues the command. Concurrent calls are served one at
    /// a time.
    ///
    /// # Returns
    /// * `Result<Option<Document>>` - The next document, or `None` when exhausted
    pub async fn next(&self) -> Result<Option<Document>> {
        if self.cancel.is_cancelled() {
            return Err(CursorError::Closed.into());
        }

        let mut phase = self.phase.lock().await;
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(CursorError::Closed.into()),
            fetched = self.fetch(&mut phase) => fetched,
        };

        // A result that raced with destroy() is discarded.
        if self.cancel.is_cancelled() {
            return Err(CursorError::Closed.into());
        }
        fetched
    }

    async fn fetch(&self, phase: &mut Phase) -> Result<Option<Document>> {
        if matches!(phase, Phase::Unbound) {
            let wire = self.bind().await?;
            *phase = Phase::Bound(wire);
        }

        let next = match phase {
            Phase::Bound(wire) => wire.fetch_next().await.inspect_err(|e| self.db.report(e))?,
            Phase::Exhausted | Phase::Unbound => return Ok(None),
            Phase::Closed => return Err(CursorError::Closed.into()),
        };

        if next.is_none() {
            debug!(namespace = %self.namespace(), "Cursor exhausted");
            if let Phase::Bound(mut wire) = std::mem::replace(phase, Phase::Exhausted) {
                wire.close().await?;
            }
        }
        Ok(next)
    }

    /// Issue the command and open the server-side cursor
    async fn bind(&self) -> Result<Box<dyn WireCursor>> {
        let conn = self.db.connection().await?;
        let command = self.descriptor.render();
        debug!(
            namespace = %self.namespace(),
            command = self.descriptor.name(),
            "Binding cursor"
        );
        conn.open_cursor(self.db.name(), command)
            .await
            .inspect_err(|e| self.db.report(e))
    }

    /// Drain the remaining documents
    pub async fn to_array(&self) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    /// Call `f` for each remaining document
    pub async fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(Document),
    {
        while let Some(doc) = self.next().await? {
            f(doc);
        }
        Ok(())
    }

    /// Map each remaining document through `f`
    pub async fn map<T, F>(&self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(Document) -> T,
    {
        let mut mapped = Vec::new();
        while let Some(doc) = self.next().await? {
            mapped.push(f(doc));
        }
        Ok(mapped)
    }

    /// Number of matching documents, ignoring skip and limit
    pub async fn count(&self) -> Result<u64> {
        self.run_count(false).await
    }

    /// Number of matching documents, honoring skip and limit
    pub async fn size(&self) -> Result<u64> {
        self.run_count(true).await
    }

    async fn run_count(&self, apply_window: bool) -> Result<u64> {
        match self.descriptor.count_request(apply_window)? {
            CountRequest::Count(command) => {
                let reply = self.db.run_command(command).await?;
                Ok(get_u64(&reply, "n"))
            }
            CountRequest::Aggregate(command) => {
                let reply = self.db.run_command(command).await?;
                let n = reply
                    .get_document("cursor")
                    .and_then(|c| c.get_array("firstBatch"))
                    .ok()
                    .and_then(|batch| batch.first())
                    .and_then(|first| first.as_document())
                    .map(|first| get_u64(first, "n"))
                    .unwrap_or(0);
                Ok(n)
            }
        }
    }

    /// Release the server-side cursor and start over on the next fetch
    pub async fn rewind(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CursorError::Closed.into());
        }

        let mut phase = self.phase.lock().await;
        if let Phase::Bound(mut wire) = std::mem::replace(&mut *phase, Phase::Unbound) {
            wire.close().await?;
        }
        debug!(namespace = %self.namespace(), "Cursor rewound");
        Ok(())
    }

    /// Explain the command without moving the cursor
    pub async fn explain(&self) -> Result<Document> {
        self.db.run_command(self.descriptor.explain_command()).await
    }

    /// Destroy the cursor
    ///
    /// A fetch in flight resolves to [`CursorError::Closed`]; the server-side
    /// cursor, if bound, is released. Calling it again is a no-op.
    pub async fn destroy(&self) -> Result<()> {
        self.cancel.cancel();

        let mut phase = self.phase.lock().await;
        if let Phase::Bound(mut wire) = std::mem::replace(&mut *phase, Phase::Closed) {
            debug!(namespace = %self.namespace(), "Releasing server-side cursor");
            wire.close().await?;
        }
        Ok(())
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Phase::Bound(_) = self.phase.get_mut() {
            debug!(
                namespace = %self.namespace(),
                "Cursor dropped while bound; driver releases it"
            );
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("namespace", &self.namespace())
            .field("descriptor", &self.descriptor)
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}
