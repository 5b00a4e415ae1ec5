//! Client interface to the database under test
//!
//! The harness never speaks a wire protocol itself. Everything it needs from
//! the server goes through [`Connection`]: run a statement, fetch a result
//! set, and force buffered writes to durable storage.

pub mod error;
pub mod mysql;
pub mod scripted;

use async_trait::async_trait;

use crate::value::{Datum, Row};

pub use error::{DriverError, DriverResult, ServerError};
pub use mysql::{connect, MySqlConnection};
pub use scripted::{ScriptedConnection, StatementLog};

/// Default flush statement; `{database}` is replaced by the database name
pub const DEFAULT_FLUSH_TEMPLATE: &str = "flush database {database}";

/// Server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: Option<String>) -> Self {
        Self {
            user: user.into(),
            password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Render a flush statement template for `database`
pub fn render_flush(template: &str, database: &str) -> String {
    template.replace("{database}", database)
}

/// A fetched result set
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    sql: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(sql: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            sql: sql.into(),
            columns,
            rows,
        }
    }

    /// Result of a statement that returns no rows
    pub fn empty(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new(), Vec::new())
    }

    /// The statement that produced this result
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at (`row`, `col`); `None` when out of range, `Some(Datum::Null)` for NULL
    pub fn get_cell(&self, row: usize, col: usize) -> Option<&Datum> {
        self.rows.get(row).and_then(|r| r.get(col))
    }
}

/// A session-scoped connection to the server
///
/// Statements on one connection run strictly in sequence.
#[async_trait]
pub trait Connection: Send {
    /// Run a DDL/DML statement
    async fn execute(&mut self, sql: &str) -> DriverResult<()>;

    /// Run a query and fetch every row
    async fn query(&mut self, sql: &str) -> DriverResult<ResultSet>;

    /// Force the database's buffered writes to durable storage
    async fn flush(&mut self, database: &str) -> DriverResult<()>;
}
