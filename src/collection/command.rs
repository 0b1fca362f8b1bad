//! Collection operation table
//!
//! Every operation the façade exposes maps to one wire command here. Command
//! documents are generated from the table instead of being spelled out by
//! each method.

use bson::{Bson, Document};

use crate::utils::document::merge;

/// A collection-scoped wire command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionCommand {
    Aggregate,
    CollStats,
    Count,
    CreateIndexes,
    Delete,
    Distinct,
    Drop,
    DropIndexes,
    Find,
    FindAndModify,
    Group,
    Insert,
    ListIndexes,
    MapReduce,
    ReIndex,
    Update,
}

impl CollectionCommand {
    /// Wire command name
    pub const fn name(self) -> &'static str {
        match self {
            CollectionCommand::Aggregate => "aggregate",
            CollectionCommand::CollStats => "collStats",
            CollectionCommand::Count => "count",
            CollectionCommand::CreateIndexes => "createIndexes",
            CollectionCommand::Delete => "delete",
            CollectionCommand::Distinct => "distinct",
            CollectionCommand::Drop => "drop",
            CollectionCommand::DropIndexes => "dropIndexes",
            CollectionCommand::Find => "find",
            CollectionCommand::FindAndModify => "findAndModify",
            CollectionCommand::Group => "group",
            CollectionCommand::Insert => "insert",
            CollectionCommand::ListIndexes => "listIndexes",
            CollectionCommand::MapReduce => "mapReduce",
            CollectionCommand::ReIndex => "reIndex",
            CollectionCommand::Update => "update",
        }
    }

    /// Field carrying the operations of a write command
    pub const fn payload_field(self) -> Option<&'static str> {
        match self {
            CollectionCommand::Insert => Some("documents"),
            CollectionCommand::Update => Some("updates"),
            CollectionCommand::Delete => Some("deletes"),
            _ => None,
        }
    }

    /// Build the command document for `collection`
    ///
    /// Most commands take the form `{<name>: <collection>, ...body}`;
    /// `group` nests its body under `{group: {ns: <collection>, ...}}`.
    pub fn build(self, collection: &str, body: Document) -> Document {
        let mut command = Document::new();
        match self {
            CollectionCommand::Group => {
                let mut spec = Document::new();
                spec.insert("ns", collection);
                merge(&mut spec, body);
                command.insert(self.name(), Bson::Document(spec));
            }
            _ => {
                command.insert(self.name(), collection);
                merge(&mut command, body);
            }
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_write_payloads() {
        assert_eq!(CollectionCommand::Insert.payload_field(), Some("documents"));
        assert_eq!(CollectionCommand::Update.payload_field(), Some("updates"));
        assert_eq!(CollectionCommand::Delete.payload_field(), Some("deletes"));
        assert_eq!(CollectionCommand::Find.payload_field(), None);
    }

    #[test]
    fn test_build_puts_command_name_first() {
        let command = CollectionCommand::Distinct.build("users", doc! { "key": "age", "query": {} });
        assert_eq!(command, doc! { "distinct": "users", "key": "age", "query": {} });
        assert_eq!(command.keys().next().map(String::as_str), Some("distinct"));
    }

    #[test]
    fn test_build_keeps_body_order() {
        let command = CollectionCommand::Count.build("users", doc! { "query": { "a": 1 }, "limit": 2_i64 });
        assert_eq!(
            command,
            doc! { "count": "users", "query": { "a": 1 }, "limit": 2_i64 }
        );
    }

    #[test]
    fn test_build_group_nests_spec() {
        let command = CollectionCommand::Group.build("sales", doc! { "initial": { "total": 0 } });
        assert_eq!(
            command,
            doc! { "group": { "ns": "sales", "initial": { "total": 0 } } }
        );
    }
}
