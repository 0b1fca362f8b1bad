//! Pull-driven stream adapter over a [`Cursor`]

use bson::Document;
use futures::stream::{self, BoxStream, StreamExt};

use super::Cursor;
use crate::error::Result;

impl Cursor {
    /// Turn the cursor into a stream of documents
    ///
    /// Each poll performs one fetch, so nothing is read ahead of the
    /// consumer. The stream ends at exhaustion, or right after yielding the
    /// first error.
    pub fn into_stream(self) -> BoxStream<'static, Result<Document>> {
        stream::unfold(Some(self), |cursor| async move {
            let Some(cursor) = cursor else {
                return None;
            };
            match cursor.next().await {
                Ok(Some(doc)) => Some((Ok(doc), Some(cursor))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
        .boxed()
    }
}
