//! Normalized write results

use bson::{Bson, Document};
use serde::Serialize;

use crate::utils::document::get_u64;

/// Outcome of `update`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    /// Documents matched (or upserted)
    pub n: u64,

    /// Documents actually changed
    pub n_modified: u64,

    /// Whether an existing document was updated
    pub updated_existing: bool,

    /// `_id` of the upserted document, if any
    pub upserted: Option<Bson>,
}

impl UpdateResult {
    /// Read an `update` reply
    ///
    /// When the server does not report `updatedExisting` but at least one
    /// document matched, every match was modified and nothing was upserted,
    /// the update is reported as having updated an existing document. An
    /// update that matched nothing (`n == 0`) is never flagged.
    pub fn from_reply(reply: &Document) -> Self {
        let n = get_u64(reply, "n");
        let n_modified = get_u64(reply, "nModified");
        let upserted = reply
            .get_array("upserted")
            .ok()
            .and_then(|ids| ids.first())
            .and_then(Bson::as_document)
            .and_then(|entry| entry.get("_id").cloned());

        let mut updated_existing = reply.get_bool("updatedExisting").unwrap_or(false);
        if !updated_existing && n > 0 && n_modified == n && upserted.is_none() {
            updated_existing = true;
        }

        Self {
            n,
            n_modified,
            updated_existing,
            upserted,
        }
    }
}

/// Outcome of `remove`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    /// Documents removed
    pub n: u64,
}

impl RemoveResult {
    /// Read a `delete` reply
    pub fn from_reply(reply: &Document) -> Self {
        Self {
            n: get_u64(reply, "n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_full_modification_counts_as_existing() {
        let result = UpdateResult::from_reply(&doc! { "ok": 1, "n": 1, "nModified": 1, "updatedExisting": false });
        assert!(result.updated_existing);
        assert_eq!(result.n, 1);
    }

    #[test]
    fn test_unmodified_match_is_not_flagged() {
        let result = UpdateResult::from_reply(&doc! { "ok": 1, "n": 2, "nModified": 1 });
        assert!(!result.updated_existing);
    }

    #[test]
    fn test_upsert_is_not_existing() {
        let result = UpdateResult::from_reply(&doc! {
            "ok": 1,
            "n": 1,
            "nModified": 0,
            "upserted": [{ "index": 0, "_id": 42 }],
        });
        assert!(!result.updated_existing);
        assert_eq!(result.upserted, Some(Bson::Int32(42)));
    }

    #[test]
    fn test_no_match() {
        let result = UpdateResult::from_reply(&doc! { "ok": 1, "n": 0, "nModified": 0 });
        assert!(!result.updated_existing);
    }
}
