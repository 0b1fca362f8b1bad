//! Scripted in-process wire driver for unit tests
//!
//! Records every command, counts connection attempts, can hold attempts and
//! fetches behind semaphores, and serves a fixed document set to cursors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use tokio::sync::Semaphore;

use super::{ConnectSettings, Connection, WireConnection, WireCursor, WireDriver};
use crate::error::{CommandError, ConnectionError, CursorError, MongoshError, Result};

type Handler = dyn Fn(&str, &Document) -> Option<Result<Document>> + Send + Sync;

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    closes: AtomicUsize,
    closed_cursors: AtomicUsize,
    fail_connects: AtomicUsize,
    commands: Mutex<Vec<Document>>,
    documents: Mutex<Vec<Document>>,
    cursor_error_at: Mutex<Option<usize>>,
    handler: Mutex<Option<Arc<Handler>>>,
    connect_gate: Mutex<Option<Arc<Semaphore>>>,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockDriver {
    state: Arc<MockState>,
}

impl MockDriver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Documents served by every cursor (after filter/skip/limit)
    pub(crate) fn with_documents(self, docs: Vec<Document>) -> Self {
        *self.state.documents.lock().unwrap() = docs;
        self
    }

    /// Override replies; returning `None` falls back to the default reply
    pub(crate) fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &Document) -> Option<Result<Document>> + Send + Sync + 'static,
    {
        *self.state.handler.lock().unwrap() = Some(Arc::new(handler));
        self
    }

    /// Hold connection attempts until permits are added
    pub(crate) fn gate_connects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.connect_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Hold cursor fetches until permits are added
    pub(crate) fn gate_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.state.fetch_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Fail the next `n` connection attempts
    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.state.fail_connects.store(n, Ordering::SeqCst);
    }

    /// Make cursors fail when fetching the document at `index`
    pub(crate) fn fail_cursor_at(&self, index: usize) {
        *self.state.cursor_error_at.lock().unwrap() = Some(index);
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn closed_cursors(&self) -> usize {
        self.state.closed_cursors.load(Ordering::SeqCst)
    }

    /// Every command seen so far, cursor commands included
    pub(crate) fn commands(&self) -> Vec<Document> {
        self.state.commands.lock().unwrap().clone()
    }

    /// Commands whose first key is `name`
    pub(crate) fn commands_named(&self, name: &str) -> Vec<Document> {
        self.commands()
            .into_iter()
            .filter(|cmd| cmd.keys().next().map(String::as_str) == Some(name))
            .collect()
    }

    fn matching_documents(&self, filter: Option<&Document>) -> Vec<Document> {
        let docs = self.state.documents.lock().unwrap().clone();
        match filter {
            Some(filter) => docs.into_iter().filter(|d| matches(d, filter)).collect(),
            None => docs,
        }
    }
}

/// Top-level equality match, enough for tests
fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn as_usize(value: Option<&Bson>) -> Option<usize> {
    match value {
        Some(Bson::Int32(n)) => Some(*n as usize),
        Some(Bson::Int64(n)) => Some(*n as usize),
        _ => None,
    }
}

fn apply_window(mut docs: Vec<Document>, skip: Option<usize>, limit: Option<usize>) -> Vec<Document> {
    if let Some(skip) = skip {
        docs = docs.into_iter().skip(skip).collect();
    }
    if let Some(limit) = limit.filter(|l| *l > 0) {
        docs.truncate(limit);
    }
    docs
}

#[async_trait]
impl WireDriver for MockDriver {
    async fn connect(&self, _settings: &ConnectSettings) -> Result<Connection> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        let gate = self.state.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let failing = self
            .state
            .fail_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ConnectionError::ConnectionFailed("connection refused".into()).into());
        }

        Ok(Arc::new(MockConnection {
            driver: self.clone(),
        }))
    }
}

struct MockConnection {
    driver: MockDriver,
}

impl MockConnection {
    fn default_reply(&self, command: &Document) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        let len_of = |field: &str| command.get_array(field).map(|a| a.len() as i32).unwrap_or(0);
        let reply = match name.as_str() {
            "insert" => {
                let n = len_of("documents");
                doc! { "ok": 1, "n": n }
            }
            "update" => {
                let n = len_of("updates");
                doc! { "ok": 1, "n": n, "nModified": n }
            }
            "delete" => {
                let n = len_of("deletes");
                doc! { "ok": 1, "n": n }
            }
            "count" => {
                let filter = command.get_document("query").ok();
                let docs = apply_window(
                    self.driver.matching_documents(filter),
                    as_usize(command.get("skip")),
                    as_usize(command.get("limit")),
                );
                let n = docs.len() as i32;
                doc! { "ok": 1, "n": n }
            }
            "aggregate" => {
                let mut docs = self.driver.matching_documents(None);
                let mut counted = None;
                for stage in command.get_array("pipeline").into_iter().flatten() {
                    if let Bson::Document(stage) = stage {
                        docs = apply_window(
                            docs,
                            as_usize(stage.get("$skip")),
                            as_usize(stage.get("$limit")),
                        );
                        if stage.contains_key("$count") {
                            counted = Some(docs.len() as i32);
                        }
                    }
                }
                let batch: Vec<Bson> = match counted {
                    Some(n) => vec![Bson::Document(doc! { "n": n })],
                    None => docs.into_iter().map(Bson::Document).collect(),
                };
                doc! { "ok": 1, "cursor": { "id": 0i64, "firstBatch": batch } }
            }
            _ => doc! { "ok": 1 },
        };
        Ok(reply)
    }
}

#[async_trait]
impl WireConnection for MockConnection {
    async fn command(&self, database: &str, command: Document) -> Result<Document> {
        self.driver.state.commands.lock().unwrap().push(command.clone());

        let handler = self.driver.state.handler.lock().unwrap().clone();
        if let Some(reply) = handler.and_then(|h| h(database, &command)) {
            return reply;
        }
        self.default_reply(&command)
    }

    async fn open_cursor(&self, database: &str, command: Document) -> Result<Box<dyn WireCursor>> {
        self.driver.state.commands.lock().unwrap().push(command.clone());

        let handler = self.driver.state.handler.lock().unwrap().clone();
        let docs = match handler.and_then(|h| h(database, &command)) {
            Some(Err(e)) => return Err(e),
            Some(Ok(reply)) => reply
                .get_document("cursor")
                .and_then(|c| c.get_array("firstBatch"))
                .map(|batch| {
                    batch
                        .iter()
                        .filter_map(|b| b.as_document().cloned())
                        .collect()
                })
                .unwrap_or_default(),
            None if command.contains_key("find") => apply_window(
                self.driver.matching_documents(command.get_document("filter").ok()),
                as_usize(command.get("skip")),
                as_usize(command.get("limit")),
            ),
            None => {
                let mut skip = None;
                let mut limit = None;
                for stage in command.get_array("pipeline").into_iter().flatten() {
                    if let Bson::Document(stage) = stage {
                        skip = as_usize(stage.get("$skip")).or(skip);
                        limit = as_usize(stage.get("$limit")).or(limit);
                    }
                }
                apply_window(self.driver.matching_documents(None), skip, limit)
            }
        };

        Ok(Box::new(MockCursor {
            docs: docs.into(),
            served: 0,
            error_at: *self.driver.state.cursor_error_at.lock().unwrap(),
            gate: self.driver.state.fetch_gate.lock().unwrap().clone(),
            driver: self.driver.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.driver.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockCursor {
    docs: VecDeque<Document>,
    served: usize,
    error_at: Option<usize>,
    gate: Option<Arc<Semaphore>>,
    driver: MockDriver,
}

#[async_trait]
impl WireCursor for MockCursor {
    async fn fetch_next(&mut self) -> Result<Option<Document>> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.error_at == Some(self.served) {
            return Err(MongoshError::Cursor(CursorError::FetchFailed(
                "cursor killed".into(),
            )));
        }
        self.served += 1;
        Ok(self.docs.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.state.closed_cursors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reply shaped like a server error document
pub(crate) fn server_error(code: i32, message: &str) -> MongoshError {
    MongoshError::Command(CommandError::from_reply(&doc! {
        "ok": 0,
        "errmsg": message,
        "code": code,
    }))
}
