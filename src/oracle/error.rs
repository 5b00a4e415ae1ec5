//! Oracle error types

use thiserror::Error;

/// Reasons an expected value cannot be computed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("expression cannot be evaluated: {0}")]
    Unsupported(String),

    #[error("{function} requires a numeric input, got {value}")]
    NotNumeric { function: String, value: String },

    #[error("{function} requires a text input, got {value}")]
    NotText { function: String, value: String },

    #[error("invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },
}

/// Result type for oracle computations
pub type OracleResult<T> = Result<T, OracleError>;
