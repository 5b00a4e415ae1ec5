//! Value model shared by the generator, the oracle and the driver

pub mod datum;
pub mod row;
pub mod text;

pub use datum::Datum;
pub use row::Row;
