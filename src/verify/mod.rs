//! Assertion and reporting layer
//!
//! Assertions compare a fetched [`ResultSet`] against expected cells and
//! return a [`VerificationFailure`] describing the first mismatch.

pub mod failure;

pub use failure::{FailureKind, VerificationFailure};

use crate::driver::{ResultSet, ServerError};
use crate::expand::CaseOrigin;
use crate::value::datum::approx_eq;
use crate::value::Datum;

/// Allowed deviation when comparing floating point results
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    /// Bit-for-bit equality
    Exact,
    /// `|a - b| <= eps` or `|a - b| <= eps * max(|a|, |b|)`
    Relative(f64),
}

impl Tolerance {
    /// Tolerance for values computed from single-precision storage
    pub const SINGLE: Tolerance = Tolerance::Relative(1e-6);
    /// Tolerance for values computed from double-precision storage
    pub const DOUBLE: Tolerance = Tolerance::Relative(1e-9);

    pub fn matches(&self, expected: f64, actual: f64) -> bool {
        match self {
            Tolerance::Exact => expected.to_bits() == actual.to_bits(),
            Tolerance::Relative(eps) => approx_eq(expected, actual, *eps),
        }
    }
}

/// Expected content of one result cell
#[derive(Debug, Clone, PartialEq)]
pub enum ExpectedCell {
    /// Exact equality (integers, booleans, text, NULL)
    Value(Datum),
    /// Numeric value within a tolerance
    Approx { value: f64, tolerance: Tolerance },
    /// Text whose exact content is server-defined: only nullness (when
    /// known) and a character-length bound are checked
    Text { null: Option<bool>, max_chars: usize },
}

impl ExpectedCell {
    pub fn null() -> Self {
        ExpectedCell::Value(Datum::Null)
    }

    pub fn approx(value: f64, tolerance: Tolerance) -> Self {
        ExpectedCell::Approx { value, tolerance }
    }

    /// Check an actual cell against this expectation
    pub fn matches(&self, actual: &Datum) -> bool {
        match self {
            ExpectedCell::Value(expected) => value_matches(expected, actual),
            ExpectedCell::Approx { value, tolerance } => match actual.as_f64() {
                Some(a) if !actual.is_null() => tolerance.matches(*value, a),
                _ => false,
            },
            ExpectedCell::Text { null, max_chars } => match actual {
                Datum::Null => *null != Some(false),
                Datum::String(s) => *null != Some(true) && s.chars().count() <= *max_chars,
                _ => false,
            },
        }
    }
}

impl std::fmt::Display for ExpectedCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpectedCell::Value(d) => write!(f, "{}", d),
            ExpectedCell::Approx { value, tolerance } => match tolerance {
                Tolerance::Exact => write!(f, "{}", value),
                Tolerance::Relative(eps) => write!(f, "{} (±{})", value, eps),
            },
            ExpectedCell::Text { null, max_chars } => match null {
                Some(true) => write!(f, "NULL"),
                Some(false) => write!(f, "text of at most {} chars", max_chars),
                None => write!(f, "NULL or text of at most {} chars", max_chars),
            },
        }
    }
}

/// Exact comparison, tolerant only of driver representation differences
///
/// Text compares byte-for-byte; integral values compare across signed,
/// unsigned, and timestamp encodings; floats compare bit-for-bit.
fn value_matches(expected: &Datum, actual: &Datum) -> bool {
    match (expected, actual) {
        (Datum::String(_), _) | (_, Datum::String(_)) => expected == actual,
        (Datum::Float(e), Datum::Float(a)) => e.to_bits() == a.to_bits(),
        (Datum::Float(_), _) | (_, Datum::Float(_)) => false,
        _ => expected.key_matches(actual),
    }
}

/// An expected result row located by key columns
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedRow {
    pub key: Vec<Datum>,
    pub cells: Vec<ExpectedCell>,
}

/// Result of a verification
pub type VerifyResult = Result<(), Box<VerificationFailure>>;

fn fail(failure: VerificationFailure, origin: Option<&CaseOrigin>) -> Box<VerificationFailure> {
    Box::new(match origin {
        Some(o) => failure.with_origin(o.clone()),
        None => failure,
    })
}

/// Assert the result has exactly `n` rows
pub fn assert_row_count(result: &ResultSet, n: usize) -> VerifyResult {
    if result.row_count() != n {
        return Err(Box::new(VerificationFailure::new(
            FailureKind::RowCount,
            result.sql(),
            n.to_string(),
            result.row_count().to_string(),
        )));
    }
    Ok(())
}

/// Assert the cell at (`row`, `col`) satisfies `expected`
pub fn assert_cell(result: &ResultSet, row: usize, col: usize, expected: &ExpectedCell) -> VerifyResult {
    let actual = result.get_cell(row, col);
    let matched = actual.map(|a| expected.matches(a)).unwrap_or(false);
    if !matched {
        let actual = actual
            .map(Datum::to_string)
            .unwrap_or_else(|| "<no such cell>".to_string());
        return Err(Box::new(
            VerificationFailure::new(
                FailureKind::CellMismatch,
                result.sql(),
                expected.to_string(),
                actual,
            )
            .at(row, col),
        ));
    }
    Ok(())
}

/// Assert that the server rejected `sql`
pub fn assert_failed(sql: &str, outcome: &Result<ResultSet, ServerError>) -> VerifyResult {
    match outcome {
        Err(_) => Ok(()),
        Ok(result) => Err(Box::new(VerificationFailure::new(
            FailureKind::UnexpectedSuccess,
            sql,
            "server error",
            format!("{} row(s)", result.row_count()),
        ))),
    }
}

/// Match result rows to expected rows by their key columns
///
/// Every expected row must be matched by exactly one result row and every
/// result row must match an expected row. Row order is irrelevant.
pub fn assert_keyed_rows(
    result: &ResultSet,
    key_columns: &[usize],
    value_columns: &[usize],
    expected: &[ExpectedRow],
    origin: Option<&CaseOrigin>,
) -> VerifyResult {
    if result.row_count() != expected.len() {
        return Err(fail(
            VerificationFailure::new(
                FailureKind::RowCount,
                result.sql(),
                expected.len().to_string(),
                result.row_count().to_string(),
            ),
            origin,
        ));
    }

    let mut remaining: Vec<&ExpectedRow> = expected.iter().collect();
    for row_idx in 0..result.row_count() {
        let key: Vec<Datum> = key_columns
            .iter()
            .map(|&c| result.get_cell(row_idx, c).cloned().unwrap_or_default())
            .collect();

        let pos = remaining.iter().position(|exp| {
            exp.key.len() == key.len() && exp.key.iter().zip(&key).all(|(e, a)| e.key_matches(a))
        });
        let Some(pos) = pos else {
            return Err(fail(
                VerificationFailure::new(
                    FailureKind::UnexpectedRow,
                    result.sql(),
                    "a row with a known key",
                    format_key(&key),
                )
                .at_row(row_idx),
                origin,
            ));
        };
        let exp = remaining.swap_remove(pos);

        for (cell, &col) in exp.cells.iter().zip(value_columns) {
            assert_cell(result, row_idx, col, cell).map_err(|f| {
                let mut f = *f;
                f.expected = format!("{} for key {}", f.expected, format_key(&exp.key));
                fail(f, origin)
            })?;
        }
    }

    if let Some(missing) = remaining.first() {
        return Err(fail(
            VerificationFailure::new(
                FailureKind::MissingRow,
                result.sql(),
                format_key(&missing.key),
                "no matching row",
            ),
            origin,
        ));
    }
    Ok(())
}

/// Bound on the number of rows a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowBound {
    Exactly(usize),
    AtMost(usize),
}

impl RowBound {
    pub fn admits(&self, n: usize) -> bool {
        match *self {
            RowBound::Exactly(m) => n == m,
            RowBound::AtMost(m) => n <= m,
        }
    }
}

impl std::fmt::Display for RowBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowBound::Exactly(n) => write!(f, "{}", n),
            RowBound::AtMost(n) => write!(f, "at most {}", n),
        }
    }
}

/// What a successful query must return
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Only the number of rows is checked
    RowCount(usize),
    /// Literal mode: every cell of every row, in result order
    Cells(Vec<Vec<ExpectedCell>>),
    /// Oracle mode: rows located by their key columns, in any order
    Keyed {
        key_columns: Vec<usize>,
        value_columns: Vec<usize>,
        rows: Vec<ExpectedRow>,
    },
    /// Every returned row satisfies the same bound in `column`
    EachRow {
        column: usize,
        cell: ExpectedCell,
        rows: RowBound,
    },
}

/// Check a result against an expectation
pub fn check(result: &ResultSet, expectation: &Expectation, origin: Option<&CaseOrigin>) -> VerifyResult {
    let attach = |f: Box<VerificationFailure>| fail(*f, origin);
    match expectation {
        Expectation::RowCount(n) => assert_row_count(result, *n).map_err(attach),
        Expectation::Cells(rows) => {
            assert_row_count(result, rows.len()).map_err(attach)?;
            for (r, cells) in rows.iter().enumerate() {
                for (c, cell) in cells.iter().enumerate() {
                    assert_cell(result, r, c, cell).map_err(attach)?;
                }
            }
            Ok(())
        }
        Expectation::Keyed {
            key_columns,
            value_columns,
            rows,
        } => assert_keyed_rows(result, key_columns, value_columns, rows, origin),
        Expectation::EachRow { column, cell, rows } => {
            if !rows.admits(result.row_count()) {
                return Err(fail(
                    VerificationFailure::new(
                        FailureKind::RowCount,
                        result.sql(),
                        rows.to_string(),
                        result.row_count().to_string(),
                    ),
                    origin,
                ));
            }
            for r in 0..result.row_count() {
                assert_cell(result, r, *column, cell).map_err(attach)?;
            }
            Ok(())
        }
    }
}

fn format_key(key: &[Datum]) -> String {
    let parts: Vec<String> = key.iter().map(Datum::to_string).collect();
    format!("({})", parts.join(", "))
}
