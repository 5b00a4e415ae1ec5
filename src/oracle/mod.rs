//! Oracle - expected results computed from generated rows
//!
//! Nothing here talks to the server. Expected values come from the rows the
//! data generator produced and the documented semantics of the function
//! under test, so a wrong server answer cannot leak into its own check.

pub mod error;
pub mod eval;
pub mod functions;

use std::collections::HashSet;

pub use error::{OracleError, OracleResult};
pub use eval::{eval, Evaluated};

use crate::catalog::{ColumnDef, DataType, TableDef};
use crate::datagen::Dataset;
use crate::expand::Expr;
use crate::value::{Datum, Row};
use crate::verify::{ExpectedCell, ExpectedRow, Expectation, RowBound, Tolerance};

/// A generated row together with the table it was inserted into
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Unqualified table name, as reported by `tbname`
    pub table: String,
    pub row: Row,
}

/// The rows a query target holds: one table, or a super-table's children
#[derive(Debug, Clone)]
pub struct Target {
    /// Qualified name used in FROM
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<SourceRow>,
}

impl Target {
    /// A single ordinary table or subtable
    pub fn from_dataset(dataset: &Dataset) -> Self {
        Self {
            name: dataset.table.qualified_name(),
            columns: dataset.table.columns.clone(),
            rows: dataset
                .rows
                .iter()
                .map(|row| SourceRow {
                    table: dataset.table.name.clone(),
                    row: row.clone(),
                })
                .collect(),
        }
    }

    /// A super-table seen through the union of its children's rows
    pub fn union(super_table: &TableDef, children: &[&Dataset]) -> Self {
        Self {
            name: super_table.qualified_name(),
            columns: super_table.columns.clone(),
            rows: children
                .iter()
                .flat_map(|d| {
                    d.rows.iter().map(move |row| SourceRow {
                        table: d.table.name.clone(),
                        row: row.clone(),
                    })
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column_index(&self, name: &str) -> OracleResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| OracleError::UnknownColumn(name.to_string()))
    }

    /// Every stored value of one column
    pub fn column_values(&self, name: &str) -> OracleResult<Vec<&Datum>> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|r| r.row.get(idx))
            .collect())
    }

    fn eval(&self, expr: &Expr, row: &SourceRow) -> OracleResult<Evaluated> {
        eval(expr, &self.columns, &row.row)
    }
}

/// Tolerance for aggregates over a column of the given type
pub fn tolerance_for(data_type: DataType) -> Tolerance {
    match data_type {
        DataType::Float => Tolerance::SINGLE,
        _ => Tolerance::DOUBLE,
    }
}

/// Expected `spread(column)` over the whole target
pub fn spread_cell(target: &Target, column: &str) -> OracleResult<ExpectedCell> {
    let idx = target.column_index(column)?;
    let value = functions::spread(target.column_values(column)?)?;
    Ok(ExpectedCell::approx(
        value,
        tolerance_for(target.columns[idx].data_type),
    ))
}

/// Expected rows of `select substr(expr, pos, len), tbname, ts from target`
///
/// One row per stored row, keyed by `(tbname, ts)` in result columns 1 and 2.
pub fn substr_rows(target: &Target, expr: &Expr, pos: i64, len: Option<i64>) -> OracleResult<Expectation> {
    let rows = target
        .rows
        .iter()
        .map(|source| {
            let value = functions::substr(target.eval(expr, source)?, pos, len)?;
            let ts = source.row.get(0).cloned().unwrap_or_default();
            Ok(ExpectedRow {
                key: vec![Datum::String(source.table.clone()), ts],
                cells: vec![value.into_expected()],
            })
        })
        .collect::<OracleResult<Vec<_>>>()?;

    Ok(Expectation::Keyed {
        key_columns: vec![1, 2],
        value_columns: vec![0],
        rows,
    })
}

/// Expected rows of `select substr(expr, pos, len), expr from target group by expr`
///
/// With `not_null_only` the query carries `having expr is not null`. Groups
/// are keyed by the group value in result column 1. When the grouped value
/// is server-rendered text its groups cannot be predicted, so every row is
/// only bounded instead.
pub fn substr_groups(
    target: &Target,
    expr: &Expr,
    pos: i64,
    len: Option<i64>,
    not_null_only: bool,
) -> OracleResult<Expectation> {
    let evaluated = target
        .rows
        .iter()
        .map(|source| target.eval(expr, source))
        .collect::<OracleResult<Vec<_>>>()?;

    if let Some(bound) = evaluated.iter().find_map(|e| match e {
        Evaluated::Opaque { max_chars, .. } => Some(*max_chars),
        _ => None,
    }) {
        let candidates = evaluated
            .iter()
            .filter(|e| !(not_null_only && e.is_null()))
            .count();
        let sliced = functions::substr(
            Evaluated::Opaque {
                null: false,
                max_chars: bound,
            },
            pos,
            len,
        )?;
        let max_chars = match sliced {
            Evaluated::Opaque { max_chars, .. } => max_chars,
            Evaluated::Exact(_) => bound,
        };
        return Ok(Expectation::EachRow {
            column: 0,
            cell: ExpectedCell::Text {
                null: not_null_only.then_some(false),
                max_chars,
            },
            rows: RowBound::AtMost(candidates),
        });
    }

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for value in evaluated {
        let Evaluated::Exact(group) = value else {
            continue;
        };
        if (not_null_only && group.is_null()) || !seen.insert(group.clone()) {
            continue;
        }
        let cell = functions::substr(Evaluated::Exact(group.clone()), pos, len)?;
        rows.push(ExpectedRow {
            key: vec![group],
            cells: vec![cell.into_expected()],
        });
    }

    Ok(Expectation::Keyed {
        key_columns: vec![1],
        value_columns: vec![0],
        rows,
    })
}
