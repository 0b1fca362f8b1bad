//! Bulk execution results

use bson::{Bson, Document};
use serde::Serialize;

use super::BatchKind;
use crate::error::{CommandError, MongoshError};
use crate::utils::document::get_u64;

/// An upserted document, indexed in the caller's operation order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upserted {
    pub index: usize,
    #[serde(rename = "_id")]
    pub id: Bson,
}

/// A per-operation write error, indexed in the caller's operation order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteErrorEntry {
    pub index: usize,
    pub code: Option<i32>,
    pub errmsg: String,
}

/// Aggregated outcome of a bulk execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWriteResult {
    pub write_errors: Vec<WriteErrorEntry>,
    pub write_concern_errors: Vec<Document>,
    pub n_inserted: u64,
    pub n_updated: u64,
    pub n_matched: u64,
    pub n_modified: u64,
    pub n_removed: u64,
    pub upserted: Vec<Upserted>,
    pub ok: bool,
}

impl BulkWriteResult {
    /// Fold one batch reply into the totals
    ///
    /// # Arguments
    /// * `kind` - Kind of the batch the reply belongs to
    /// * `first_index` - Operation index of the batch's first entry
    /// * `reply` - The server reply
    ///
    /// # Returns
    /// * `Option<MongoshError>` - The first failure the reply reports, if any
    pub(crate) fn absorb(
        &mut self,
        kind: BatchKind,
        first_index: usize,
        reply: &Document,
    ) -> Option<MongoshError> {
        let n = get_u64(reply, "n");
        match kind {
            BatchKind::Insert => self.n_inserted += n,
            BatchKind::Delete => self.n_removed += n,
            BatchKind::Update => {
                let upserted: Vec<Upserted> = reply
                    .get_array("upserted")
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(Bson::as_document)
                            .map(|entry| Upserted {
                                index: first_index + get_u64(entry, "index") as usize,
                                id: entry.get("_id").cloned().unwrap_or(Bson::Null),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                self.n_updated += n;
                self.n_matched += n.saturating_sub(upserted.len() as u64);
                self.n_modified += get_u64(reply, "nModified");
                self.upserted.extend(upserted);
            }
        }

        let mut failure = None;

        if let Ok(errors) = reply.get_array("writeErrors") {
            for entry in errors.iter().filter_map(Bson::as_document) {
                let error = CommandError::from_reply(entry);
                self.write_errors.push(WriteErrorEntry {
                    index: first_index + get_u64(entry, "index") as usize,
                    code: error.code,
                    errmsg: error.message.clone(),
                });
                failure.get_or_insert(MongoshError::Command(error));
            }
        }

        if let Ok(wc_error) = reply.get_document("writeConcernError") {
            self.write_concern_errors.push(wc_error.clone());
            failure.get_or_insert(MongoshError::Command(CommandError::from_reply(wc_error)));
        }

        failure
    }
}

/// Shape of a bulk operation before execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub n_insert_ops: usize,
    pub n_update_ops: usize,
    pub n_remove_ops: usize,
    pub n_batches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_update_accounting_rebases_upserts() {
        let mut result = BulkWriteResult::default();
        let reply = doc! {
            "ok": 1,
            "n": 3,
            "nModified": 1,
            "upserted": [{ "index": 1, "_id": 9 }],
        };
        assert!(result.absorb(BatchKind::Update, 4, &reply).is_none());

        assert_eq!(result.n_updated, 3);
        assert_eq!(result.n_matched, 2);
        assert_eq!(result.n_modified, 1);
        assert_eq!(
            result.upserted,
            vec![Upserted {
                index: 5,
                id: Bson::Int32(9)
            }]
        );
    }

    #[test]
    fn test_write_errors_are_collected() {
        let mut result = BulkWriteResult::default();
        let reply = doc! {
            "ok": 1,
            "n": 1,
            "writeErrors": [
                { "index": 1, "code": 11000, "errmsg": "E11000 duplicate key error" },
                { "index": 2, "code": 11000, "errmsg": "E11000 duplicate key error" },
            ],
        };
        let failure = result.absorb(BatchKind::Insert, 10, &reply);

        assert_eq!(result.n_inserted, 1);
        assert_eq!(result.write_errors.len(), 2);
        assert_eq!(result.write_errors[0].index, 11);
        assert_eq!(result.write_errors[1].index, 12);
        assert!(matches!(failure, Some(MongoshError::Command(e)) if e.code == Some(11000)));
    }

    #[test]
    fn test_serializes_with_shell_names() {
        let result = BulkWriteResult {
            n_inserted: 2,
            ok: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["nInserted"], 2);
        assert_eq!(json["writeErrors"], serde_json::json!([]));
        assert_eq!(json["ok"], true);
    }
}
