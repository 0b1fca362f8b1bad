//! Option structs for collection operations

use bson::{Bson, Document, JavaScriptCodeWithScope, doc};
use serde::{Deserialize, Serialize};

use crate::cursor::CommandDescriptor;

/// Options for `find`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Sort specification
    #[serde(default)]
    pub sort: Option<Document>,

    /// Documents to skip
    #[serde(default)]
    pub skip: Option<u64>,

    /// Maximum number of documents
    #[serde(default)]
    pub limit: Option<i64>,

    /// Documents per server batch
    #[serde(default, rename = "batchSize")]
    pub batch_size: Option<u32>,
}

impl FindOptions {
    /// Copy the options onto a command descriptor
    pub(crate) fn apply(self, descriptor: &mut CommandDescriptor) {
        descriptor.sort = self.sort.or(descriptor.sort.take());
        descriptor.skip = self.skip.or(descriptor.skip);
        descriptor.limit = self.limit.or(descriptor.limit);
        descriptor.batch_size = self.batch_size.or(descriptor.batch_size);
    }
}

/// Options for `update`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Insert a document when nothing matches
    #[serde(default)]
    pub upsert: bool,

    /// Update every matching document instead of the first
    #[serde(default)]
    pub multi: bool,
}

/// Options for `findAndModify`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindAndModifyOptions {
    /// Selection filter
    pub query: Document,

    /// Picks the document when several match
    pub sort: Option<Document>,

    /// Update to apply; exclusive with `remove`
    pub update: Option<Document>,

    /// Remove the selected document
    pub remove: bool,

    /// Return the modified document instead of the original
    pub new: bool,

    /// Insert when nothing matches
    pub upsert: bool,

    /// Projection of the returned document
    pub fields: Option<Document>,
}

impl FindAndModifyOptions {
    pub(crate) fn to_body(&self) -> Document {
        let mut body = doc! { "query": self.query.clone() };
        if let Some(sort) = &self.sort {
            body.insert("sort", sort.clone());
        }
        if self.remove {
            body.insert("remove", true);
        }
        if let Some(update) = &self.update {
            body.insert("update", update.clone());
        }
        if self.new {
            body.insert("new", true);
        }
        if self.upsert {
            body.insert("upsert", true);
        }
        if let Some(fields) = &self.fields {
            body.insert("fields", fields.clone());
        }
        body
    }
}

/// Arguments of the legacy `group` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSpec {
    /// Fields to group by
    pub key: Option<Document>,

    /// JavaScript function computing the grouping key, instead of `key`
    pub keyf: Option<String>,

    /// Selection filter
    pub cond: Document,

    /// Initial aggregation document
    pub initial: Document,

    /// JavaScript reduce function
    pub reduce: String,

    /// Optional JavaScript finalize function
    pub finalize: Option<String>,
}

impl GroupSpec {
    pub(crate) fn to_body(&self) -> Document {
        let mut body = Document::new();
        if let Some(key) = &self.key {
            body.insert("key", key.clone());
        }
        body.insert("initial", self.initial.clone());
        body.insert("$reduce", Bson::JavaScriptCode(self.reduce.clone()));
        body.insert("out", "inline");
        body.insert("cond", self.cond.clone());
        if let Some(finalize) = &self.finalize {
            body.insert("finalize", Bson::JavaScriptCode(finalize.clone()));
        }
        if let Some(keyf) = &self.keyf {
            body.insert("$keyf", Bson::JavaScriptCode(keyf.clone()));
        }
        body
    }
}

/// Options for `mapReduce`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapReduceOptions {
    /// Selection filter
    pub query: Option<Document>,

    /// Output target; inline when unset
    pub out: Option<Bson>,

    /// Variables visible to the JavaScript functions
    pub scope: Option<Document>,
}

impl MapReduceOptions {
    pub(crate) fn to_body(&self, map: &str, reduce: &str) -> Document {
        let code = |source: &str| match &self.scope {
            Some(scope) => Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope {
                code: source.to_string(),
                scope: scope.clone(),
            }),
            None => Bson::JavaScriptCode(source.to_string()),
        };

        doc! {
            "map": code(map),
            "reduce": code(reduce),
            "query": self.query.clone().unwrap_or_default(),
            "out": self.out.clone().unwrap_or_else(|| Bson::Document(doc! { "inline": 1 })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_options_apply() {
        let mut descriptor = CommandDescriptor::find("users", doc! {});
        descriptor.skip = Some(3);
        FindOptions {
            limit: Some(10),
            ..Default::default()
        }
        .apply(&mut descriptor);

        assert_eq!(descriptor.limit, Some(10));
        assert_eq!(descriptor.skip, Some(3));
    }

    #[test]
    fn test_find_and_modify_body() {
        let options = FindAndModifyOptions {
            query: doc! { "_id": 1 },
            update: Some(doc! { "$inc": { "n": 1 } }),
            new: true,
            ..Default::default()
        };
        assert_eq!(
            options.to_body(),
            doc! { "query": { "_id": 1 }, "update": { "$inc": { "n": 1 } }, "new": true }
        );
    }

    #[test]
    fn test_group_body_uses_javascript() {
        let spec = GroupSpec {
            key: Some(doc! { "region": 1 }),
            initial: doc! { "total": 0 },
            reduce: "function (cur, acc) { acc.total += cur.amount; }".into(),
            ..Default::default()
        };
        let body = spec.to_body();
        assert!(matches!(body.get("$reduce"), Some(Bson::JavaScriptCode(_))));
        assert_eq!(body.get_str("out").unwrap(), "inline");
        assert!(!body.contains_key("finalize"));
    }

    #[test]
    fn test_map_reduce_defaults_to_inline() {
        let body = MapReduceOptions::default().to_body("function () {}", "function () {}");
        assert_eq!(body.get_document("out").unwrap(), &doc! { "inline": 1 });
        assert_eq!(body.get_document("query").unwrap(), &doc! {});
    }
}
