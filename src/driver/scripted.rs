//! In-process connection answering from a responder closure
//!
//! Used for dry runs of a suite without a server and by the crate's tests,
//! where the responder plays the server's role.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{render_flush, Connection, DriverResult, ResultSet, DEFAULT_FLUSH_TEMPLATE};

type Responder = Box<dyn FnMut(&str) -> DriverResult<ResultSet> + Send>;

/// Shared record of every statement a [`ScriptedConnection`] received
#[derive(Debug, Clone, Default)]
pub struct StatementLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl StatementLog {
    fn push(&self, sql: &str) {
        self.inner.lock().push(sql.to_string());
    }

    /// Statements received so far, in order
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Whether any received statement contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.inner.lock().iter().any(|s| s.contains(needle))
    }
}

/// A connection whose answers come from a closure
pub struct ScriptedConnection {
    responder: Responder,
    log: StatementLog,
}

impl ScriptedConnection {
    /// Answer every statement with `responder`
    ///
    /// `execute` discards the returned rows; an `Err` is reported as-is.
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> DriverResult<ResultSet> + Send + 'static,
    {
        Self {
            responder: Box::new(responder),
            log: StatementLog::default(),
        }
    }

    /// Accept every statement, returning no rows
    pub fn accepting() -> Self {
        Self::new(|sql| Ok(ResultSet::empty(sql)))
    }

    /// Handle on the statement log, usable after the connection is moved
    pub fn log(&self) -> StatementLog {
        self.log.clone()
    }

    fn respond(&mut self, sql: &str) -> DriverResult<ResultSet> {
        self.log.push(sql);
        (self.responder)(sql)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&mut self, sql: &str) -> DriverResult<()> {
        self.respond(sql).map(|_| ())
    }

    async fn query(&mut self, sql: &str) -> DriverResult<ResultSet> {
        self.respond(sql)
    }

    async fn flush(&mut self, database: &str) -> DriverResult<()> {
        let sql = render_flush(DEFAULT_FLUSH_TEMPLATE, database);
        self.respond(&sql).map(|_| ())
    }
}
