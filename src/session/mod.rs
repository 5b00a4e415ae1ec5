//! Test sessions
//!
//! A session owns one connection and one database namespace that no other
//! live session in the process can use. Everything a session creates lives
//! in that database, so teardown is a single `drop database`.
//!
//! Teardown is scoped: [`TestSession::scoped`] closes the session whether
//! the body succeeded or failed. A session dropped without being closed
//! (for example while a test panics) spawns a best-effort drop on the
//! current runtime.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use parking_lot::{const_mutex, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::{SchemaBuilder, TableDef};
use crate::config::HarnessConfig;
use crate::datagen::{DataGenerator, Dataset};
use crate::driver::{self, Connection};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::QueryExecutor;

/// Rows per INSERT statement
pub const INSERT_BATCH: usize = 16;

/// Database names held by live sessions
static LIVE_NAMESPACES: Mutex<BTreeSet<String>> = const_mutex(BTreeSet::new());
static NEXT_NAMESPACE: AtomicU64 = AtomicU64::new(0);

/// Exclusive claim on a database name, released on drop
#[derive(Debug)]
pub struct Namespace {
    name: String,
}

impl Namespace {
    /// Claim a fresh name starting with `prefix`
    pub fn claim(prefix: &str) -> Self {
        loop {
            let n = NEXT_NAMESPACE.fetch_add(1, Ordering::Relaxed);
            let name = format!("{}_{}_{}", prefix, std::process::id(), n);
            if let Some(ns) = Self::claim_exact(&name) {
                return ns;
            }
        }
    }

    /// Claim exactly `name`; `None` if a live session holds it
    pub fn claim_exact(name: &str) -> Option<Self> {
        let mut live = LIVE_NAMESPACES.lock();
        if !live.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a live session holds `name`
    pub fn is_live(name: &str) -> bool {
        LIVE_NAMESPACES.lock().contains(name)
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        LIVE_NAMESPACES.lock().remove(&self.name);
    }
}

/// One connection, one exclusive database
pub struct TestSession {
    executor: QueryExecutor,
    namespace: Namespace,
    schema: SchemaBuilder,
    closed: bool,
}

impl TestSession {
    /// Connect to the configured server and create the session database
    ///
    /// The connect itself is bounded by the statement timeout.
    pub async fn open(config: &HarnessConfig) -> HarnessResult<Self> {
        let timeout = config.statement_timeout;
        let connecting = driver::connect(&config.endpoint, &config.credentials);
        let conn = match tokio::time::timeout(timeout, connecting).await {
            Ok(conn) => conn?.with_flush_template(config.flush_sql.clone()),
            Err(_) => {
                warn!(endpoint = %config.endpoint, ?timeout, "connect timed out");
                return Err(HarnessError::Timeout {
                    sql: format!("connect {}", config.endpoint),
                    timeout,
                });
            }
        };
        Self::with_connection(Box::new(conn), config).await
    }

    /// Create the session database over an existing connection
    pub async fn with_connection(conn: Box<dyn Connection>, config: &HarnessConfig) -> HarnessResult<Self> {
        let namespace = Namespace::claim(&config.db_prefix);
        let mut session = Self {
            executor: QueryExecutor::new(conn, config.statement_timeout),
            schema: SchemaBuilder::new(namespace.name()),
            namespace,
            closed: false,
        };

        let db = session.database().to_string();
        let setup = [
            format!("drop database if exists {}", db),
            format!("create database {}", db),
            format!("use {}", db),
        ];
        for (step, sql) in setup.iter().enumerate() {
            if let Err(e) = session.executor.execute(sql).await {
                session.closed = true;
                // The database exists once `create` went through
                if step > 1 {
                    if let Err(drop_err) = session.executor.execute(&setup[0]).await {
                        warn!(database = %db, error = %drop_err, "teardown after failed open");
                    }
                }
                return Err(e);
            }
        }
        info!(database = %db, "session opened");
        Ok(session)
    }

    /// Name of the session database
    pub fn database(&self) -> &str {
        self.namespace.name()
    }

    /// Table definitions of this session
    pub fn schema(&mut self) -> &mut SchemaBuilder {
        &mut self.schema
    }

    pub fn executor(&mut self) -> &mut QueryExecutor {
        &mut self.executor
    }

    /// Issue the CREATE statement for a defined table
    pub async fn create_table(&mut self, table: &TableDef) -> HarnessResult<()> {
        self.executor.execute(&table.create_sql()).await
    }

    /// Insert a dataset's rows
    pub async fn insert(&mut self, dataset: &Dataset) -> HarnessResult<()> {
        for sql in DataGenerator::insert_statements(&dataset.table, &dataset.rows, INSERT_BATCH) {
            self.executor.execute(&sql).await?;
        }
        debug!(table = %dataset.table.name, rows = dataset.rows.len(), "inserted");
        Ok(())
    }

    /// Force the session database to durable storage
    pub async fn flush(&mut self) -> HarnessResult<()> {
        let db = self.database().to_string();
        self.executor.flush(&db).await
    }

    /// Drop the session database and release the namespace
    pub async fn close(mut self) -> HarnessResult<()> {
        self.closed = true;
        let sql = format!("drop database if exists {}", self.database());
        self.executor.execute(&sql).await?;
        info!(database = %self.database(), "session closed");
        Ok(())
    }

    /// Run `body` in a fresh session, tearing it down however `body` ends
    ///
    /// The body's error takes precedence over a teardown error, which is
    /// then only logged.
    pub async fn scoped<T, F>(conn: Box<dyn Connection>, config: &HarnessConfig, body: F) -> HarnessResult<T>
    where
        F: for<'s> FnOnce(&'s mut TestSession) -> BoxFuture<'s, HarnessResult<T>>,
    {
        let mut session = Self::with_connection(conn, config).await?;
        let result = body(&mut session).await;
        let database = session.database().to_string();
        let teardown = session.close().await;

        match (result, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_err)) => {
                warn!(database = %database, error = %teardown_err, "teardown failed after error");
                Err(e)
            }
        }
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let sql = format!("drop database if exists {}", self.database());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let mut conn = self.executor.detach();
                handle.spawn(async move {
                    if let Err(e) = conn.execute(&sql).await {
                        warn!(sql = %sql, error = %e, "best-effort teardown failed");
                    }
                });
            }
            Err(_) => {
                warn!(database = %self.database(), "session dropped outside a runtime; database left behind");
            }
        }
    }
}

impl std::fmt::Debug for TestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSession")
            .field("database", &self.database())
            .field("closed", &self.closed)
            .finish()
    }
}
