//! Schema definition errors

use thiserror::Error;

/// Malformed table or column definitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A table needs at least one column
    #[error("Table '{0}' has no columns")]
    NoColumns(String),

    /// The first column of every table must be the primary timestamp
    #[error("Table '{table}': first column '{column}' must be a timestamp")]
    MissingPrimaryTimestamp { table: String, column: String },

    /// Two columns (or two tags) share a name
    #[error("Table '{table}': duplicate column '{column}'")]
    DuplicateColumn { table: String, column: String },

    /// A tag column has the same name as a data column
    #[error("Table '{table}': tag '{tag}' collides with a data column")]
    TagCollision { table: String, tag: String },

    /// A super-table must declare at least one tag column
    #[error("Super-table '{0}' declares no tag columns")]
    NoTags(String),

    /// Fixed-length text types need a positive width
    #[error("Table '{table}': column '{column}' has zero width")]
    InvalidWidth { table: String, column: String },

    /// A table with this name was already defined
    #[error("Table '{0}' already exists")]
    TableExists(String),

    /// Subtables can only be derived from super-tables
    #[error("Table '{0}' is not a super-table")]
    NotSuperTable(String),

    /// Wrong number of tag values for a subtable
    #[error("Subtable '{table}': expected {expected} tag values, got {got}")]
    TagArity {
        table: String,
        expected: usize,
        got: usize,
    },

    /// A tag value does not fit its tag column's type
    #[error("Subtable '{table}': value {value} does not fit tag '{tag}'")]
    TagType {
        table: String,
        tag: String,
        value: String,
    },

    /// A generated primary timestamp falls outside the representable range
    #[error("Table '{table}': timestamp of row {index} overflows")]
    TimestampOverflow { table: String, index: usize },
}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
