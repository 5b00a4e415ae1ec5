//! Verification failure records

use std::fmt;

use thiserror::Error;

use crate::expand::CaseOrigin;

/// What kind of mismatch was observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Result had the wrong number of rows
    RowCount,
    /// A cell differed from its expected value
    CellMismatch,
    /// A returned row matched no expected key
    UnexpectedRow,
    /// An expected key was absent from the result
    MissingRow,
    /// The server accepted a statement that must be rejected
    UnexpectedSuccess,
    /// The server rejected a statement that must succeed
    UnexpectedServerError,
    /// Results before and after a durability flush differ
    FlushDivergence,
    /// A returned cell could not be decoded
    Undecodable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::RowCount => "row count mismatch",
            FailureKind::CellMismatch => "cell mismatch",
            FailureKind::UnexpectedRow => "unexpected row",
            FailureKind::MissingRow => "missing row",
            FailureKind::UnexpectedSuccess => "statement unexpectedly succeeded",
            FailureKind::UnexpectedServerError => "statement unexpectedly rejected",
            FailureKind::FlushDivergence => "result changed after flush",
            FailureKind::Undecodable => "result could not be decoded",
        };
        f.write_str(s)
    }
}

/// A server result inconsistent with the oracle
///
/// Carries everything needed to rerun the single statement by hand.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "{kind}: {sql}{location}; expected {expected}, got {actual}{case}",
    location = location_suffix(.row, .column),
    case = origin_suffix(.origin)
)]
pub struct VerificationFailure {
    pub kind: FailureKind,
    pub sql: String,
    pub row: Option<usize>,
    pub column: Option<usize>,
    pub expected: String,
    pub actual: String,
    pub origin: Option<CaseOrigin>,
}

impl VerificationFailure {
    pub fn new(
        kind: FailureKind,
        sql: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            sql: sql.into(),
            row: None,
            column: None,
            expected: expected.into(),
            actual: actual.into(),
            origin: None,
        }
    }

    #[must_use]
    pub fn at(mut self, row: usize, column: usize) -> Self {
        self.row = Some(row);
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_origin(mut self, origin: CaseOrigin) -> Self {
        self.origin = Some(origin);
        self
    }
}

fn location_suffix(row: &Option<usize>, column: &Option<usize>) -> String {
    match (row, column) {
        (Some(r), Some(c)) => format!(" at ({}, {})", r, c),
        (Some(r), None) => format!(" at row {}", r),
        _ => String::new(),
    }
}

fn origin_suffix(origin: &Option<CaseOrigin>) -> String {
    origin
        .as_ref()
        .map(|o| format!(" [{}]", o))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_reproduction_details() {
        let failure = VerificationFailure::new(
            FailureKind::CellMismatch,
            "select spread(c1) from db.t1",
            "10",
            "9",
        )
        .at(0, 0)
        .with_origin(CaseOrigin {
            template: "spread".to_string(),
            rule: Some(0),
            index: 3,
        });
        let text = failure.to_string();
        assert!(text.contains("select spread(c1) from db.t1"));
        assert!(text.contains("at (0, 0)"));
        assert!(text.contains("expected 10, got 9"));
        assert!(text.contains("spread[rule 0, case 3]"));
    }

    #[test]
    fn test_error_source_and_bare_display() {
        let failure = VerificationFailure::new(FailureKind::RowCount, "select 1", "1", "0").at_row(2);
        assert_eq!(failure.to_string(), "row count mismatch: select 1 at row 2; expected 1, got 0");

        let err: &dyn std::error::Error = &failure;
        assert!(err.source().is_none());
    }
}
