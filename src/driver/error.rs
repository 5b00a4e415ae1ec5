//! Driver error types

use thiserror::Error;

/// A statement rejected by the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("server error {code}: {message}")]
pub struct ServerError {
    /// Server-provided error code
    pub code: i32,
    /// Server-provided message
    pub message: String,
}

impl ServerError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors reported by a [`Connection`](super::Connection)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// The server could not be reached or the link was lost
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the statement
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A returned value could not be converted
    #[error("cannot decode column {column}: {message}")]
    Decode { column: String, message: String },
}

impl From<mysql_async::Error> for DriverError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) => DriverError::Server(ServerError {
                code: i32::from(e.code),
                message: e.message,
            }),
            other => DriverError::Connection(other.to_string()),
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;
