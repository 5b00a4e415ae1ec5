//! Row-level evaluation of argument expressions
//!
//! Values the server renders in its own way (floating point and timestamp
//! values cast to text) evaluate to [`Evaluated::Opaque`]: nullness and a
//! length bound are still known, the exact text is not.

use super::error::{OracleError, OracleResult};
use crate::catalog::{ColumnDef, DataType};
use crate::expand::Expr;
use crate::value::text::{fit_bytes, fit_chars};
use crate::value::{Datum, Row};
use crate::verify::ExpectedCell;

/// Outcome of evaluating an expression against one row
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluated {
    /// The value is fully determined
    Exact(Datum),
    /// Text with server-defined content of at most `max_chars` characters
    Opaque { null: bool, max_chars: usize },
}

impl Evaluated {
    pub fn is_null(&self) -> bool {
        match self {
            Evaluated::Exact(d) => d.is_null(),
            Evaluated::Opaque { null, .. } => *null,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Evaluated::Opaque { .. })
    }

    /// Expected cell for a result column holding this value
    pub fn into_expected(self) -> ExpectedCell {
        match self {
            Evaluated::Exact(d) => ExpectedCell::Value(d),
            Evaluated::Opaque { null, max_chars } => ExpectedCell::Text {
                null: Some(null),
                max_chars,
            },
        }
    }
}

/// Evaluate `expr` over `row`, whose values follow `columns`
pub fn eval(expr: &Expr, columns: &[ColumnDef], row: &Row) -> OracleResult<Evaluated> {
    match expr {
        Expr::Column(col) => {
            let idx = columns
                .iter()
                .position(|c| c.name == col.name)
                .ok_or_else(|| OracleError::UnknownColumn(col.name.clone()))?;
            let value = row
                .get(idx)
                .cloned()
                .ok_or_else(|| OracleError::UnknownColumn(col.name.clone()))?;
            Ok(Evaluated::Exact(value))
        }
        Expr::Literal(d) => Ok(Evaluated::Exact(d.clone())),
        Expr::Ident(_) | Expr::Star => Err(OracleError::Unsupported(expr.to_string())),
        Expr::Upper(inner) => match eval(inner, columns, row)? {
            Evaluated::Exact(Datum::String(s)) => Ok(Evaluated::Exact(Datum::String(s.to_uppercase()))),
            Evaluated::Exact(Datum::Null) => Ok(Evaluated::Exact(Datum::Null)),
            opaque @ Evaluated::Opaque { .. } => Ok(opaque),
            Evaluated::Exact(other) => Err(OracleError::NotText {
                function: "upper".to_string(),
                value: other.to_string(),
            }),
        },
        Expr::Ceil(inner) => match eval(inner, columns, row)? {
            Evaluated::Exact(Datum::Float(f)) => Ok(Evaluated::Exact(Datum::Float(f.ceil()))),
            Evaluated::Exact(d @ (Datum::Int(_) | Datum::UInt(_) | Datum::Null)) => Ok(Evaluated::Exact(d)),
            other => Err(OracleError::NotNumeric {
                function: "ceil".to_string(),
                value: format!("{:?}", other),
            }),
        },
        Expr::Cast { expr: inner, target } => cast_text(eval(inner, columns, row)?, *target),
        Expr::Add(a, b) => {
            let (a, b) = (eval(a, columns, row)?, eval(b, columns, row)?);
            match (a, b) {
                (Evaluated::Exact(a), Evaluated::Exact(b)) => {
                    if a.is_null() || b.is_null() {
                        return Ok(Evaluated::Exact(Datum::Null));
                    }
                    Ok(Evaluated::Exact(Datum::Float(arith_operand(&a) + arith_operand(&b))))
                }
                _ => Err(OracleError::Unsupported(expr.to_string())),
            }
        }
        Expr::Concat(a, b) => concat(eval(a, columns, row)?, eval(b, columns, row)?),
    }
}

/// Cast a value to a character type of the given width
fn cast_text(value: Evaluated, target: DataType) -> OracleResult<Evaluated> {
    let (width, fit): (usize, fn(String, usize) -> String) = match target {
        DataType::Binary(n) => (n as usize, fit_bytes),
        DataType::NChar(n) => (n as usize, fit_chars),
        other => {
            return Err(OracleError::Unsupported(format!(
                "cast to {}",
                other.sql_name()
            )))
        }
    };
    Ok(match value {
        Evaluated::Exact(Datum::Null) => Evaluated::Exact(Datum::Null),
        Evaluated::Exact(d) => match d.cast_text() {
            Some(text) => Evaluated::Exact(Datum::String(fit(text, width))),
            None => Evaluated::Opaque {
                null: false,
                max_chars: width,
            },
        },
        Evaluated::Opaque { null, max_chars } => Evaluated::Opaque {
            null,
            max_chars: max_chars.min(width),
        },
    })
}

fn concat(a: Evaluated, b: Evaluated) -> OracleResult<Evaluated> {
    let text_len = |e: &Evaluated| -> OracleResult<Option<usize>> {
        match e {
            Evaluated::Exact(Datum::Null) => Ok(None),
            Evaluated::Exact(Datum::String(s)) => Ok(Some(s.chars().count())),
            Evaluated::Opaque { null: true, .. } => Ok(None),
            Evaluated::Opaque { max_chars, .. } => Ok(Some(*max_chars)),
            Evaluated::Exact(other) => Err(OracleError::NotText {
                function: "concat".to_string(),
                value: other.to_string(),
            }),
        }
    };
    let (la, lb) = (text_len(&a)?, text_len(&b)?);
    let (Some(la), Some(lb)) = (la, lb) else {
        return Ok(Evaluated::Exact(Datum::Null));
    };
    match (a, b) {
        (Evaluated::Exact(Datum::String(x)), Evaluated::Exact(Datum::String(y))) => {
            Ok(Evaluated::Exact(Datum::String(x + &y)))
        }
        _ => Ok(Evaluated::Opaque {
            null: false,
            max_chars: la + lb,
        }),
    }
}

/// Numeric value of an arithmetic operand
///
/// Text converts through its longest numeric prefix (zero when there is
/// none), booleans to 0/1, timestamps to epoch milliseconds.
fn arith_operand(value: &Datum) -> f64 {
    match value {
        Datum::String(s) => leading_number(s),
        other => other.as_f64().unwrap_or(0.0),
    }
}

fn leading_number(text: &str) -> f64 {
    let s = text.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
        return 0.0;
    }
    let mantissa_end = end;
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    s[..end]
        .parse::<f64>()
        .or_else(|_| s[..mantissa_end].parse::<f64>())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("ts", DataType::Timestamp),
            ColumnDef::new("c1", DataType::Int),
            ColumnDef::new("c5", DataType::Float),
            ColumnDef::new("c7", DataType::Bool),
            ColumnDef::new("c8", DataType::Binary(16)),
            ColumnDef::new("c9", DataType::NChar(32)),
            ColumnDef::new("c10", DataType::Timestamp),
        ]
    }

    fn row() -> Row {
        Row::new(vec![
            Datum::Timestamp(1_000),
            Datum::Int(-7),
            Datum::Float(1.5),
            Datum::Bool(true),
            Datum::from("binary3"),
            Datum::from("nchar_测试_3"),
            Datum::Timestamp(1_003),
        ])
    }

    fn null_row() -> Row {
        let mut values = vec![Datum::Timestamp(2_000)];
        values.extend(std::iter::repeat(Datum::Null).take(6));
        Row::new(values)
    }

    fn col(name: &str) -> Expr {
        let ty = columns()
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.data_type)
            .unwrap();
        Expr::column(name, ty)
    }

    const B16: DataType = DataType::Binary(16);

    #[test]
    fn test_exact_casts() {
        let cols = columns();
        assert_eq!(
            eval(&Expr::cast(col("c1"), B16), &cols, &row()).unwrap(),
            Evaluated::Exact(Datum::from("-7"))
        );
        assert_eq!(
            eval(&Expr::cast(col("c7"), B16), &cols, &row()).unwrap(),
            Evaluated::Exact(Datum::from("true"))
        );
        assert_eq!(
            eval(&Expr::cast(col("c1"), DataType::Binary(1)), &cols, &row()).unwrap(),
            Evaluated::Exact(Datum::from("-"))
        );
    }

    #[test]
    fn test_server_rendered_casts_are_opaque() {
        let cols = columns();
        for e in [
            Expr::cast(col("c5"), B16),
            Expr::cast(col("c10"), B16),
            Expr::cast(Expr::add(col("c8"), col("c1")), B16),
        ] {
            assert_eq!(
                eval(&e, &cols, &row()).unwrap(),
                Evaluated::Opaque {
                    null: false,
                    max_chars: 16
                },
                "{}",
                e
            );
            assert_eq!(eval(&e, &cols, &null_row()).unwrap(), Evaluated::Exact(Datum::Null));
        }
    }

    #[test]
    fn test_upper_and_concat() {
        let cols = columns();
        assert_eq!(
            eval(&Expr::upper(col("c9")), &cols, &row()).unwrap(),
            Evaluated::Exact(Datum::from("NCHAR_测试_3"))
        );
        assert_eq!(
            eval(&Expr::concat(col("c8"), col("c9")), &cols, &row()).unwrap(),
            Evaluated::Exact(Datum::from("binary3nchar_测试_3"))
        );
        let mixed = Expr::concat(Expr::cast(Expr::add(col("c8"), col("c1")), B16), col("c8"));
        assert_eq!(
            eval(&mixed, &cols, &row()).unwrap(),
            Evaluated::Opaque {
                null: false,
                max_chars: 23
            }
        );
        assert!(eval(&Expr::upper(col("c1")), &cols, &row()).is_err());
    }

    #[test]
    fn test_unknown_column() {
        let err = eval(&Expr::column("c99", DataType::Int), &columns(), &row()).unwrap_err();
        assert_eq!(err, OracleError::UnknownColumn("c99".to_string()));
    }

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("12abc"), 12.0);
        assert_eq!(leading_number("  -1.5e2x"), -150.0);
        assert_eq!(leading_number("1e"), 1.0);
        assert_eq!(leading_number("binary3"), 0.0);
        assert_eq!(leading_number("."), 0.0);
    }
}
