//! Bulk write batching
//!
//! A [`Bulk`] collects inserts, updates and removes in call order and groups
//! maximal runs of the same kind into one write command each. `execute()`
//! sends the commands one after another and folds the replies into a single
//! [`BulkWriteResult`]:
//! - Ordered: stops at the first failing batch
//! - Unordered: runs every batch, then reports the first failure
//!
//! Batches that already ran are never rolled back; a failure carries the
//! counts aggregated so far.

pub mod result;

use bson::{Bson, Document, doc};
use tracing::{debug, info, warn};

use crate::collection::{Collection, CollectionCommand};
use crate::error::{BulkWriteError, ExecutionError, MongoshError, Result};
use crate::utils::document::ensure_id;

pub use result::{BulkSummary, BulkWriteResult, Upserted, WriteErrorEntry};

/// Write kinds a batch can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Insert,
    Update,
    Delete,
}

impl BatchKind {
    /// Wire command for this kind
    pub const fn command(self) -> CollectionCommand {
        match self {
            BatchKind::Insert => CollectionCommand::Insert,
            BatchKind::Update => CollectionCommand::Update,
            BatchKind::Delete => CollectionCommand::Delete,
        }
    }
}

/// One queued operation
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Insert(Document),
    Update {
        filter: Document,
        update: Document,
        multi: bool,
        upsert: bool,
    },
    Remove {
        filter: Document,
        limit: i32,
    },
}

impl BatchEntry {
    pub fn kind(&self) -> BatchKind {
        match self {
            BatchEntry::Insert(_) => BatchKind::Insert,
            BatchEntry::Update { .. } => BatchKind::Update,
            BatchEntry::Remove { .. } => BatchKind::Delete,
        }
    }

    fn to_bson(&self) -> Bson {
        match self {
            BatchEntry::Insert(doc) => Bson::Document(doc.clone()),
            BatchEntry::Update {
                filter,
                update,
                multi,
                upsert,
            } => Bson::Document(doc! {
                "q": filter.clone(),
                "u": update.clone(),
                "multi": *multi,
                "upsert": *upsert,
            }),
            BatchEntry::Remove { filter, limit } => Bson::Document(doc! {
                "q": filter.clone(),
                "limit": *limit,
            }),
        }
    }
}

/// A run of same-kind operations sent as one command
#[derive(Debug, Clone)]
struct Batch {
    kind: BatchKind,
    first_index: usize,
    entries: Vec<BatchEntry>,
}

impl Batch {
    fn to_command(&self, collection: &str, ordered: bool, write_concern: &Document) -> Document {
        let command = self.kind.command();
        let mut body = Document::new();
        if let Some(field) = command.payload_field() {
            body.insert(
                field,
                self.entries.iter().map(BatchEntry::to_bson).collect::<Vec<_>>(),
            );
        }
        body.insert("ordered", ordered);
        body.insert("writeConcern", write_concern.clone());
        command.build(collection, body)
    }
}

/// Bulk write builder
#[derive(Debug)]
pub struct Bulk {
    collection: Collection,
    ordered: bool,
    batches: Vec<Batch>,
    current: Option<Batch>,
    op_count: usize,
    executed: bool,
}

impl Bulk {
    pub(crate) fn new(collection: Collection, ordered: bool) -> Self {
        Self {
            collection,
            ordered,
            batches: Vec::new(),
            current: None,
            op_count: 0,
            executed: false,
        }
    }

    /// Whether batches stop at the first failure
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Queue an insert; a missing `_id` is generated
    pub fn insert(&mut self, mut doc: Document) -> &mut Self {
        ensure_id(&mut doc);
        self.push(BatchEntry::Insert(doc));
        self
    }

    /// Select documents for an update or remove
    pub fn find(&mut self, filter: Document) -> BulkFind<'_> {
        BulkFind {
            bulk: self,
            filter,
            upsert: false,
        }
    }

    fn push(&mut self, entry: BatchEntry) {
        if self.executed {
            warn!(kind = ?entry.kind(), "Bulk operation already executed; operation ignored");
            return;
        }

        let kind = entry.kind();
        if self.current.as_ref().is_some_and(|batch| batch.kind != kind) {
            self.flush();
        }

        let first_index = self.op_count;
        self.current
            .get_or_insert_with(|| Batch {
                kind,
                first_index,
                entries: Vec::new(),
            })
            .entries
            .push(entry);
        self.op_count += 1;
    }

    /// Close the open batch
    fn flush(&mut self) {
        if let Some(batch) = self.current.take() {
            self.batches.push(batch);
        }
    }

    fn queued(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter().chain(self.current.iter())
    }

    /// The commands `execute()` would send, in order
    pub fn commands(&self) -> Vec<Document> {
        let write_concern = self.collection.database().write_concern().to_document();
        self.queued()
            .map(|batch| batch.to_command(self.collection.name(), self.ordered, &write_concern))
            .collect()
    }

    /// Operation counts of the queued batches
    pub fn to_json(&self) -> BulkSummary {
        self.queued().fold(BulkSummary::default(), |mut summary, batch| {
            let ops = batch.entries.len();
            match batch.kind {
                BatchKind::Insert => summary.n_insert_ops += ops,
                BatchKind::Update => summary.n_update_ops += ops,
                BatchKind::Delete => summary.n_remove_ops += ops,
            }
            summary.n_batches += 1;
            summary
        })
    }

    /// Send every batch, in order
    ///
    /// # Returns
    /// * `Result<BulkWriteResult>` - Aggregated counts, or a
    ///   [`MongoshError::Bulk`] carrying the counts so far and the first failure
    pub async fn execute(&mut self) -> Result<BulkWriteResult> {
        if self.executed {
            return Err(ExecutionError::BulkAlreadyExecuted.into());
        }
        if self.op_count == 0 {
            return Err(MongoshError::invalid_parameters("no operations to execute"));
        }
        self.executed = true;
        self.flush();

        let batches = std::mem::take(&mut self.batches);
        let db = self.collection.database().clone();
        let write_concern = db.write_concern().to_document();

        info!(
            namespace = %self.collection.full_name(),
            batches = batches.len(),
            ordered = self.ordered,
            "Executing bulk operation"
        );

        let mut result = BulkWriteResult::default();
        let mut failure = None;

        for (i, batch) in batches.iter().enumerate() {
            let command = batch.to_command(self.collection.name(), self.ordered, &write_concern);
            debug!(
                batch = i,
                kind = ?batch.kind,
                ops = batch.entries.len(),
                "Executing bulk batch"
            );

            let error = match db.run_command(command).await {
                Ok(reply) => result.absorb(batch.kind, batch.first_index, &reply),
                Err(e) => Some(e),
            };

            if let Some(e) = error {
                warn!(batch = i, error = %e, "Bulk batch failed");
                failure.get_or_insert(e);
                if self.ordered {
                    break;
                }
            }
        }

        result.ok = failure.is_none();
        match failure {
            None => Ok(result),
            Some(cause) => Err(BulkWriteError {
                result,
                cause: Box::new(cause),
            }
            .into()),
        }
    }
}

/// Update/remove builder returned by [`Bulk::find`]
#[derive(Debug)]
pub struct BulkFind<'a> {
    bulk: &'a mut Bulk,
    filter: Document,
    upsert: bool,
}

impl BulkFind<'_> {
    /// Insert when nothing matches
    pub fn upsert(mut self) -> Self {
        self.upsert = true;
        self
    }

    fn queue_update(self, update: Document, multi: bool) {
        self.bulk.push(BatchEntry::Update {
            filter: self.filter,
            update,
            multi,
            upsert: self.upsert,
        });
    }

    /// Update every matching document
    pub fn update(self, update: Document) {
        self.queue_update(update, true);
    }

    /// Update the first matching document
    pub fn update_one(self, update: Document) {
        self.queue_update(update, false);
    }

    /// Replace the first matching document
    pub fn replace_one(self, replacement: Document) {
        self.queue_update(replacement, false);
    }

    /// Remove every matching document
    pub fn remove(self) {
        self.bulk.push(BatchEntry::Remove {
            filter: self.filter,
            limit: 0,
        });
    }

    /// Remove the first matching document
    pub fn remove_one(self) {
        self.bulk.push(BatchEntry::Remove {
            filter: self.filter,
            limit: 1,
        });
    }
}
