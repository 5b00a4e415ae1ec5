//! Top-level error taxonomy

use std::time::Duration;

use thiserror::Error;

use crate::catalog::SchemaError;
use crate::config::ConfigError;
use crate::driver::{DriverError, ServerError};
use crate::oracle::OracleError;
use crate::verify::VerificationFailure;

/// Errors raised while running a test session
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Malformed table or column definition; aborts the session
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Server unreachable or link lost; aborts the session
    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Statement rejected by the server
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Server result inconsistent with the oracle
    #[error("verification failed: {0}")]
    Verification(Box<VerificationFailure>),

    /// Statement did not complete in time; never retried
    #[error("statement timed out after {timeout:?}: {sql}")]
    Timeout { sql: String, timeout: Duration },

    /// A returned cell could not be decoded; fails the statement, not the session
    #[error("undecodable value in column {column}: {message}")]
    Decode { column: String, message: String },

    /// No expected value could be computed for a case
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
}

impl HarnessError {
    /// Whether the error ends the session rather than a single case
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HarnessError::Verification(_) | HarnessError::Decode { .. })
    }
}

impl From<DriverError> for HarnessError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Server(e) => HarnessError::Server(e),
            DriverError::Connection(msg) => HarnessError::Connection(msg),
            DriverError::Decode { column, message } => HarnessError::Decode { column, message },
        }
    }
}

impl From<Box<VerificationFailure>> for HarnessError {
    fn from(failure: Box<VerificationFailure>) -> Self {
        HarnessError::Verification(failure)
    }
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;
