//! sqlprobe - combinatorial verification of SQL functions against a live server
//!
//! Features:
//! - Validated schema definitions for ordinary, super and child tables
//! - Deterministic row generation with boundary and NULL rows
//! - Declarative expansion of function arguments over typed column roles
//! - Expected results computed independently of the server
//! - Per-session database namespaces with scoped teardown

pub mod catalog;
pub mod config;
pub mod datagen;
pub mod driver;
pub mod error;
pub mod executor;
pub mod expand;
pub mod oracle;
pub mod session;
pub mod suites;
pub mod value;
pub mod verify;

pub use catalog::{ColumnDef, DataType, SchemaBuilder, SchemaError, TableDef};
pub use config::HarnessConfig;
pub use driver::{Connection, ResultSet, ScriptedConnection, ServerError};
pub use error::{HarnessError, HarnessResult};
pub use executor::{QueryExecutor, TestCase};
pub use session::TestSession;
pub use suites::{SuitePlan, SuiteReport};
pub use value::{Datum, Row};
pub use verify::{FailureKind, VerificationFailure};
