//! Collection façade
//!
//! Shell-style collection operations. Each method builds one command from
//! the [`CollectionCommand`] table and runs it through the database's shared
//! connection, or returns a lazy [`Cursor`] for query-shaped operations:
//! - Queries: find, find_one, aggregate, aggregate_cursor, count, distinct
//! - Writes: insert, insert_one, save, update, remove, find_and_modify
//! - Indexes: create_index, ensure_index, drop_index, drop_indexes, get_indexes, re_index
//! - Admin: drop, stats, is_capped, group, map_reduce, run_command
//! - Bulk: initialize_ordered_bulk_op, initialize_unordered_bulk_op

pub mod command;
pub mod options;
pub mod result;

use std::fmt;

use bson::{Bson, Document, doc};
use tracing::debug;

use crate::bulk::Bulk;
use crate::cursor::{CommandDescriptor, Cursor};
use crate::database::Database;
use crate::error::{ExecutionError, Result};
use crate::utils::document::{check_write_reply, ensure_id, index_name, merge};

pub use command::CollectionCommand;
pub use options::{FindAndModifyOptions, FindOptions, GroupSpec, MapReduceOptions, UpdateOptions};
pub use result::{RemoveResult, UpdateResult};

/// Batch size requested by `aggregate_cursor`
const AGGREGATE_BATCH_SIZE: u32 = 1000;

/// Handle on one collection
#[derive(Debug, Clone)]
pub struct Collection {
    db: Database,
    name: String,
}

impl Collection {
    pub(crate) fn new(db: Database, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<database>.<collection>`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.db.name(), self.name)
    }

    /// The database this collection belongs to
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn run(&self, command: CollectionCommand, body: Document) -> Result<Document> {
        self.db.run_command(command.build(&self.name, body)).await
    }

    /// Run a write command carrying `entries`
    async fn write(&self, command: CollectionCommand, entries: Vec<Bson>) -> Result<Document> {
        let Some(field) = command.payload_field() else {
            return Err(ExecutionError::UnsupportedOperation(format!(
                "'{}' is not a write command",
                command.name()
            ))
            .into());
        };

        debug!(
            namespace = %self.full_name(),
            command = command.name(),
            count = entries.len(),
            "Executing write"
        );

        let mut body = Document::new();
        body.insert(field, entries);
        body.insert("ordered", true);
        body.insert("writeConcern", self.db.write_concern().to_document());

        let reply = self.run(command, body).await?;
        check_write_reply(reply)
    }

    /// Query the collection
    ///
    /// Nothing is sent until the returned cursor is consumed.
    ///
    /// # Arguments
    /// * `filter` - Query filter
    /// * `projection` - Optional projection
    /// * `options` - Optional sort/skip/limit/batch size
    pub fn find(
        &self,
        filter: Document,
        projection: Option<Document>,
        options: Option<FindOptions>,
    ) -> Cursor {
        let mut descriptor = CommandDescriptor::find(&self.name, filter);
        descriptor.projection = projection;
        if let Some(options) = options {
            options.apply(&mut descriptor);
        }
        Cursor::new(self.db.clone(), descriptor)
    }

    /// First matching document
    pub async fn find_one(
        &self,
        filter: Document,
        projection: Option<Document>,
    ) -> Result<Option<Document>> {
        let cursor = self.find(filter, projection, None).limit(1);
        let doc = cursor.next().await?;
        cursor.destroy().await?;
        Ok(doc)
    }

    /// Insert documents
    ///
    /// Documents without an `_id` get a generated one.
    ///
    /// # Returns
    /// * `Result<Vec<Document>>` - The inserted documents, with their ids
    pub async fn insert(&self, mut docs: Vec<Document>) -> Result<Vec<Document>> {
        for doc in docs.iter_mut() {
            ensure_id(doc);
        }

        let entries = docs.iter().cloned().map(Bson::Document).collect();
        self.write(CollectionCommand::Insert, entries).await?;
        Ok(docs)
    }

    /// Insert one document
    pub async fn insert_one(&self, mut doc: Document) -> Result<Document> {
        ensure_id(&mut doc);
        self.write(CollectionCommand::Insert, vec![Bson::Document(doc.clone())])
            .await?;
        Ok(doc)
    }

    /// Upsert by `_id` when present, insert otherwise
    pub async fn save(&self, doc: Document) -> Result<Document> {
        match doc.get("_id").cloned() {
            Some(id) if !matches!(id, Bson::Null) => {
                let options = UpdateOptions {
                    upsert: true,
                    multi: false,
                };
                self.update(doc! { "_id": id }, doc.clone(), options).await?;
                Ok(doc)
            }
            _ => self.insert_one(doc).await,
        }
    }

    /// Update documents
    ///
    /// # Arguments
    /// * `filter` - Selection filter
    /// * `update` - Update operators or replacement document
    /// * `options` - upsert / multi flags
    pub async fn update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> Result<UpdateResult> {
        let entry = doc! {
            "q": filter,
            "u": update,
            "upsert": options.upsert,
            "multi": options.multi,
        };
        let reply = self
            .write(CollectionCommand::Update, vec![Bson::Document(entry)])
            .await?;
        Ok(UpdateResult::from_reply(&reply))
    }

    /// Remove documents
    ///
    /// # Arguments
    /// * `filter` - Selection filter
    /// * `just_one` - Remove at most one document
    pub async fn remove(&self, filter: Document, just_one: bool) -> Result<RemoveResult> {
        let entry = doc! { "q": filter, "limit": if just_one { 1 } else { 0 } };
        let reply = self
            .write(CollectionCommand::Delete, vec![Bson::Document(entry)])
            .await?;
        Ok(RemoveResult::from_reply(&reply))
    }

    /// Find one document and update or remove it
    ///
    /// The reply always carries `lastErrorObject`, defaulting to `{n: 0}`.
    pub async fn find_and_modify(&self, options: FindAndModifyOptions) -> Result<Document> {
        let mut reply = self
            .run(CollectionCommand::FindAndModify, options.to_body())
            .await?;
        if !reply.contains_key("lastErrorObject") {
            reply.insert("lastErrorObject", doc! { "n": 0 });
        }
        Ok(reply)
    }

    /// Run an aggregation and collect its results
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.aggregate_cursor(pipeline).to_array().await
    }

    /// Cursor over an aggregation
    pub fn aggregate_cursor(&self, pipeline: Vec<Document>) -> Cursor {
        Cursor::new(
            self.db.clone(),
            CommandDescriptor::aggregate(&self.name, pipeline),
        )
        .batch_size(AGGREGATE_BATCH_SIZE)
    }

    /// Count the documents matching `query`
    pub async fn count(&self, query: Document) -> Result<u64> {
        self.find(query, None, None).count().await
    }

    /// Distinct values of `key` among the documents matching `query`
    pub async fn distinct(&self, key: &str, query: Document) -> Result<Vec<Bson>> {
        let reply = self
            .run(CollectionCommand::Distinct, doc! { "key": key, "query": query })
            .await?;
        reply
            .get_array("values")
            .cloned()
            .map_err(|_| ExecutionError::UnexpectedReply("distinct reply has no values".into()).into())
    }

    /// Create an index
    ///
    /// # Arguments
    /// * `keys` - Index key document, e.g. `{a: 1, b: -1}`
    /// * `options` - Index options; `name` defaults to one derived from the keys
    pub async fn create_index(&self, keys: Document, options: Option<Document>) -> Result<Document> {
        let mut spec = doc! { "name": index_name(&keys), "key": keys };
        merge(&mut spec, options.unwrap_or_default());
        self.run(CollectionCommand::CreateIndexes, doc! { "indexes": [spec] })
            .await
    }

    /// Alias of [`Collection::create_index`]
    pub async fn ensure_index(&self, keys: Document, options: Option<Document>) -> Result<Document> {
        self.create_index(keys, options).await
    }

    /// Drop one index, by name or key document
    pub async fn drop_index(&self, index: impl Into<Bson>) -> Result<Document> {
        self.run(CollectionCommand::DropIndexes, doc! { "index": index.into() })
            .await
    }

    /// Drop every index except `_id`
    pub async fn drop_indexes(&self) -> Result<Document> {
        self.run(CollectionCommand::DropIndexes, doc! { "index": "*" })
            .await
    }

    /// Index descriptions
    pub async fn get_indexes(&self) -> Result<Vec<Document>> {
        let command = CollectionCommand::ListIndexes.build(&self.name, Document::new());
        Cursor::new(self.db.clone(), CommandDescriptor::raw(command))
            .to_array()
            .await
    }

    /// Rebuild the indexes
    pub async fn re_index(&self) -> Result<Document> {
        self.run(CollectionCommand::ReIndex, Document::new()).await
    }

    /// Drop the collection
    ///
    /// # Returns
    /// * `Result<bool>` - `false` when the collection did not exist
    pub async fn drop(&self) -> Result<bool> {
        match self.run(CollectionCommand::Drop, Document::new()).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_namespace_not_found() => {
                debug!(namespace = %self.full_name(), "Drop of missing collection");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Collection statistics
    pub async fn stats(&self) -> Result<Document> {
        self.run(CollectionCommand::CollStats, Document::new()).await
    }

    /// Whether the collection is capped
    pub async fn is_capped(&self) -> Result<bool> {
        let stats = self.stats().await?;
        Ok(stats.get_bool("capped").unwrap_or(false))
    }

    /// Legacy `group` command
    ///
    /// # Returns
    /// * `Result<Bson>` - The `retval` array
    pub async fn group(&self, spec: GroupSpec) -> Result<Bson> {
        let reply = self.run(CollectionCommand::Group, spec.to_body()).await?;
        Ok(reply.get("retval").cloned().unwrap_or(Bson::Array(Vec::new())))
    }

    /// Map-reduce with JavaScript `map` and `reduce` functions
    pub async fn map_reduce(
        &self,
        map: &str,
        reduce: &str,
        options: MapReduceOptions,
    ) -> Result<Document> {
        self.run(CollectionCommand::MapReduce, options.to_body(map, reduce))
            .await
    }

    /// Run `{<name>: <collection>, ...extra}`
    pub async fn run_command(&self, name: &str, extra: Option<Document>) -> Result<Document> {
        let mut command = Document::new();
        command.insert(name, self.name.as_str());
        merge(&mut command, extra.unwrap_or_default());
        self.db.run_command(command).await
    }

    /// Start an ordered bulk operation
    pub fn initialize_ordered_bulk_op(&self) -> Bulk {
        Bulk::new(self.clone(), true)
    }

    /// Start an unordered bulk operation
    pub fn initialize_unordered_bulk_op(&self) -> Bulk {
        Bulk::new(self.clone(), false)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
