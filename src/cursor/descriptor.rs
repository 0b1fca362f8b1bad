//! Command descriptors for lazy cursors
//!
//! A descriptor holds everything needed to (re)issue the cursor-producing
//! command: the command kind plus the modifiers accumulated before binding.

use bson::{Bson, Document, doc};
use tracing::warn;

use crate::collection::CollectionCommand;
use crate::error::{ExecutionError, Result};

/// Cursor-producing command kinds
#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// `find` over a collection
    Find { filter: Document },

    /// `aggregate` over a collection
    Aggregate { pipeline: Vec<Document> },

    /// Any other cursor command (`listIndexes`, `listCollections`, ...)
    Raw { command: Document },
}

/// How to count the documents a cursor would return
#[derive(Debug, Clone, PartialEq)]
pub enum CountRequest {
    /// A `count` command; the reply carries `n`
    Count(Document),

    /// An aggregation ending in `$count: "n"`
    Aggregate(Document),
}

/// Description of the command a cursor issues when it binds
#[derive(Debug, Clone, PartialEq)]
pub struct CommandDescriptor {
    /// Target collection (empty for raw commands)
    pub collection: String,

    /// Command kind
    pub kind: CommandKind,

    /// Projection (`find` only)
    pub projection: Option<Document>,

    /// Sort specification
    pub sort: Option<Document>,

    /// Documents to skip
    pub skip: Option<u64>,

    /// Maximum number of documents; negative means a single batch
    pub limit: Option<i64>,

    /// Documents per server batch
    pub batch_size: Option<u32>,
}

impl CommandDescriptor {
    fn with_kind(collection: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            collection: collection.into(),
            kind,
            projection: None,
            sort: None,
            skip: None,
            limit: None,
            batch_size: None,
        }
    }

    /// Describe a `find` command
    pub fn find(collection: impl Into<String>, filter: Document) -> Self {
        Self::with_kind(collection, CommandKind::Find { filter })
    }

    /// Describe an `aggregate` command
    pub fn aggregate(collection: impl Into<String>, pipeline: Vec<Document>) -> Self {
        Self::with_kind(collection, CommandKind::Aggregate { pipeline })
    }

    /// Describe an arbitrary cursor command
    pub fn raw(command: Document) -> Self {
        Self::with_kind(String::new(), CommandKind::Raw { command })
    }

    /// Command name, for logging
    pub fn name(&self) -> &str {
        match &self.kind {
            CommandKind::Find { .. } => CollectionCommand::Find.name(),
            CommandKind::Aggregate { .. } => CollectionCommand::Aggregate.name(),
            CommandKind::Raw { command } => crate::utils::document::command_name(command),
        }
    }

    /// Render the command document, modifiers included
    pub fn render(&self) -> Document {
        match &self.kind {
            CommandKind::Find { filter } => {
                let mut command = CollectionCommand::Find.build(&self.collection, doc! { "filter": filter.clone() });
                if let Some(projection) = &self.projection {
                    command.insert("projection", projection.clone());
                }
                if let Some(sort) = &self.sort {
                    command.insert("sort", sort.clone());
                }
                if let Some(skip) = self.skip {
                    command.insert("skip", skip as i64);
                }
                match self.limit {
                    Some(limit) if limit > 0 => {
                        command.insert("limit", limit);
                    }
                    Some(limit) if limit < 0 => {
                        command.insert("limit", magnitude(limit));
                        command.insert("singleBatch", true);
                    }
                    _ => {}
                }
                if let Some(batch_size) = self.batch_size {
                    command.insert("batchSize", batch_size as i64);
                }
                command
            }
            CommandKind::Aggregate { pipeline } => {
                let mut stages = pipeline.clone();
                stages.extend(self.window_stages(true));
                let mut cursor = Document::new();
                if let Some(batch_size) = self.batch_size {
                    cursor.insert("batchSize", batch_size as i64);
                }
                CollectionCommand::Aggregate.build(
                    &self.collection,
                    doc! { "pipeline": stages, "cursor": cursor },
                )
            }
            CommandKind::Raw { command } => {
                if self.sort.is_some() || self.skip.is_some() || self.limit.is_some() {
                    warn!(
                        command = self.name(),
                        "sort/skip/limit do not apply to this cursor command; ignored"
                    );
                }
                let mut command = command.clone();
                if let Some(batch_size) = self.batch_size {
                    let mut cursor = command.get_document("cursor").cloned().unwrap_or_default();
                    cursor.insert("batchSize", batch_size as i64);
                    command.insert("cursor", cursor);
                }
                command
            }
        }
    }

    /// Trailing `$sort` / `$skip` / `$limit` stages for an aggregation
    fn window_stages(&self, with_sort: bool) -> Vec<Document> {
        let mut stages = Vec::new();
        if with_sort {
            if let Some(sort) = &self.sort {
                stages.push(doc! { "$sort": sort.clone() });
            }
        }
        if let Some(skip) = self.skip {
            stages.push(doc! { "$skip": skip as i64 });
        }
        if let Some(limit) = self.limit.filter(|l| *l != 0) {
            stages.push(doc! { "$limit": magnitude(limit) });
        }
        stages
    }

    /// Build the command counting the matching documents
    ///
    /// # Arguments
    /// * `apply_window` - Honor skip/limit (`size()`), or ignore them (`count()`)
    pub fn count_request(&self, apply_window: bool) -> Result<CountRequest> {
        match &self.kind {
            CommandKind::Find { filter } => {
                let mut command = CollectionCommand::Count.build(&self.collection, doc! { "query": filter.clone() });
                if apply_window {
                    if let Some(skip) = self.skip {
                        command.insert("skip", skip as i64);
                    }
                    if let Some(limit) = self.limit.filter(|l| *l != 0) {
                        command.insert("limit", magnitude(limit));
                    }
                }
                Ok(CountRequest::Count(command))
            }
            CommandKind::Aggregate { pipeline } => {
                let mut stages = pipeline.clone();
                if apply_window {
                    stages.extend(self.window_stages(false));
                }
                stages.push(doc! { "$count": "n" });
                Ok(CountRequest::Aggregate(CollectionCommand::Aggregate.build(
                    &self.collection,
                    doc! { "pipeline": stages, "cursor": {} },
                )))
            }
            CommandKind::Raw { .. } => Err(ExecutionError::UnsupportedOperation(format!(
                "count on a '{}' cursor",
                self.name()
            ))
            .into()),
        }
    }

    /// Wrap the rendered command in an `explain`
    pub fn explain_command(&self) -> Document {
        doc! {
            "explain": Bson::Document(self.render()),
            "verbosity": "queryPlanner",
        }
    }
}

/// Absolute value of a limit, saturating at `i64::MAX`
fn magnitude(limit: i64) -> i64 {
    i64::try_from(limit.unsigned_abs()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_find_with_modifiers() {
        let mut desc = CommandDescriptor::find("users", doc! { "age": 30 });
        desc.projection = Some(doc! { "name": 1 });
        desc.sort = Some(doc! { "name": 1 });
        desc.skip = Some(2);
        desc.limit = Some(5);
        desc.batch_size = Some(100);

        assert_eq!(
            desc.render(),
            doc! {
                "find": "users",
                "filter": { "age": 30 },
                "projection": { "name": 1 },
                "sort": { "name": 1 },
                "skip": 2i64,
                "limit": 5i64,
                "batchSize": 100i64,
            }
        );
    }

    #[test]
    fn test_negative_limit_is_single_batch() {
        let mut desc = CommandDescriptor::find("users", doc! {});
        desc.limit = Some(-3);
        let command = desc.render();
        assert_eq!(command.get_i64("limit").unwrap(), 3);
        assert!(command.get_bool("singleBatch").unwrap());
    }

    #[test]
    fn test_most_negative_limit_saturates() {
        let mut desc = CommandDescriptor::find("users", doc! {});
        desc.limit = Some(i64::MIN);
        let command = desc.render();
        assert_eq!(command.get_i64("limit").unwrap(), i64::MAX);
        assert!(command.get_bool("singleBatch").unwrap());

        let Ok(CountRequest::Count(count)) = desc.count_request(true) else {
            panic!("expected a count command");
        };
        assert_eq!(count.get_i64("limit").unwrap(), i64::MAX);

        let mut desc = CommandDescriptor::aggregate("orders", Vec::new());
        desc.limit = Some(i64::MIN);
        let pipeline = desc.render().get_array("pipeline").unwrap().clone();
        assert_eq!(pipeline, vec![Bson::Document(doc! { "$limit": i64::MAX })]);
    }

    #[test]
    fn test_render_aggregate_appends_stages() {
        let mut desc = CommandDescriptor::aggregate("orders", vec![doc! { "$match": { "x": 1 } }]);
        desc.sort = Some(doc! { "total": -1 });
        desc.skip = Some(1);
        desc.limit = Some(2);
        desc.batch_size = Some(1000);

        assert_eq!(
            desc.render(),
            doc! {
                "aggregate": "orders",
                "pipeline": [
                    { "$match": { "x": 1 } },
                    { "$sort": { "total": -1 } },
                    { "$skip": 1i64 },
                    { "$limit": 2i64 },
                ],
                "cursor": { "batchSize": 1000i64 },
            }
        );
    }

    #[test]
    fn test_raw_command_only_takes_batch_size() {
        let mut desc = CommandDescriptor::raw(doc! { "listIndexes": "users" });
        desc.limit = Some(1);
        desc.batch_size = Some(10);
        assert_eq!(
            desc.render(),
            doc! { "listIndexes": "users", "cursor": { "batchSize": 10i64 } }
        );
    }

    #[test]
    fn test_count_ignores_window_and_size_honors_it() {
        let mut desc = CommandDescriptor::find("users", doc! { "a": 1 });
        desc.skip = Some(1);
        desc.limit = Some(2);

        assert_eq!(
            desc.count_request(false).unwrap(),
            CountRequest::Count(doc! { "count": "users", "query": { "a": 1 } })
        );
        assert_eq!(
            desc.count_request(true).unwrap(),
            CountRequest::Count(doc! {
                "count": "users",
                "query": { "a": 1 },
                "skip": 1i64,
                "limit": 2i64,
            })
        );
    }

    #[test]
    fn test_count_on_aggregate_and_raw() {
        let desc = CommandDescriptor::aggregate("orders", vec![]);
        match desc.count_request(false).unwrap() {
            CountRequest::Aggregate(command) => {
                let pipeline = command.get_array("pipeline").unwrap();
                assert_eq!(pipeline.last(), Some(&Bson::Document(doc! { "$count": "n" })));
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let raw = CommandDescriptor::raw(doc! { "listCollections": 1 });
        assert!(matches!(
            raw.count_request(true),
            Err(crate::error::MongoshError::Execution(
                ExecutionError::UnsupportedOperation(_)
            ))
        ));
    }

    #[test]
    fn test_explain_wraps_rendered_command() {
        let desc = CommandDescriptor::find("users", doc! {});
        assert_eq!(
            desc.explain_command(),
            doc! {
                "explain": { "find": "users", "filter": {} },
                "verbosity": "queryPlanner",
            }
        );
    }
}
