//! Utility functions and helpers for mongosh-client
//!
//! This module provides common utility functions used throughout the crate:
//! - Document helpers (numeric fields, reply checks, identifiers)
//! - Logging bootstrap

/// Document helpers
pub mod document {
    use bson::oid::ObjectId;
    use bson::{Bson, Document};

    use crate::error::{CommandError, MongoshError, Result};

    /// Read a numeric field as `u64`, whatever numeric type the server used
    ///
    /// Missing or non-numeric fields count as zero.
    pub fn get_u64(doc: &Document, key: &str) -> u64 {
        match doc.get(key) {
            Some(Bson::Int32(n)) => (*n).max(0) as u64,
            Some(Bson::Int64(n)) => (*n).max(0) as u64,
            Some(Bson::Double(n)) if *n > 0.0 => *n as u64,
            _ => 0,
        }
    }

    /// Name of a command document (its first key)
    pub fn command_name(command: &Document) -> &str {
        command.keys().next().map(String::as_str).unwrap_or("")
    }

    /// Whether a reply reports success
    ///
    /// Replies without an `ok` field are treated as successful.
    pub fn is_ok(reply: &Document) -> bool {
        match reply.get("ok") {
            Some(Bson::Double(ok)) => *ok != 0.0,
            Some(Bson::Int32(ok)) => *ok != 0,
            Some(Bson::Int64(ok)) => *ok != 0,
            Some(Bson::Boolean(ok)) => *ok,
            _ => true,
        }
    }

    /// Turn an `ok: 0` reply into a [`CommandError`]
    pub fn check_reply(reply: Document) -> Result<Document> {
        if is_ok(&reply) {
            Ok(reply)
        } else {
            Err(MongoshError::Command(CommandError::from_reply(&reply)))
        }
    }

    /// Turn a write reply carrying `writeErrors` or a `writeConcernError`
    /// into a [`CommandError`]
    pub fn check_write_reply(reply: Document) -> Result<Document> {
        if let Ok(errors) = reply.get_array("writeErrors") {
            if let Some(Bson::Document(first)) = errors.first() {
                let mut err = CommandError::from_reply(first);
                err.details.insert("n", reply.get("n").cloned().unwrap_or(Bson::Int32(0)));
                return Err(MongoshError::Command(err));
            }
        }

        if let Ok(wc_error) = reply.get_document("writeConcernError") {
            return Err(MongoshError::Command(CommandError::from_reply(wc_error)));
        }

        Ok(reply)
    }

    /// Copy every field of `source` into `target`, replacing existing keys
    pub fn merge(target: &mut Document, source: Document) {
        for (key, value) in source {
            target.insert(key, value);
        }
    }

    /// Make sure the document has an `_id`, generating one if needed
    ///
    /// # Returns
    /// * `Bson` - The document's identifier
    pub fn ensure_id(doc: &mut Document) -> Bson {
        match doc.get("_id") {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        }
    }

    /// Default index name for a key document, e.g. `a_1_b_-1`
    pub fn index_name(keys: &Document) -> String {
        keys.iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    Bson::Int32(n) => n.to_string(),
                    Bson::Int64(n) => n.to_string(),
                    Bson::Double(n) => n.to_string(),
                    Bson::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{field}_{direction}")
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Logging bootstrap
pub mod logging {
    use tracing_subscriber::EnvFilter;

    use crate::config::LoggingConfig;

    /// Install a global fmt subscriber for the configured level
    ///
    /// `RUST_LOG` takes precedence over the configured level. Returns
    /// `false` if a subscriber was already installed.
    pub fn init(config: &LoggingConfig) -> bool {
        let level = config.level.to_tracing_level();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false);

        let result = if config.timestamps {
            subscriber.try_init()
        } else {
            subscriber.without_time().try_init()
        };

        result.is_ok()
    }
}
