//! Semantics of the functions under test

use super::error::{OracleError, OracleResult};
use super::eval::Evaluated;
use crate::value::Datum;

/// `spread(x)`: maximum minus minimum of the non-null inputs
///
/// Empty and all-null input yield 0. Integers are widened to double before
/// subtracting, as the server does.
pub fn spread<'a, I>(values: I) -> OracleResult<f64>
where
    I: IntoIterator<Item = &'a Datum>,
{
    let mut range: Option<(f64, f64)> = None;
    for value in values {
        if value.is_null() {
            continue;
        }
        let v = match value {
            Datum::Bool(_) | Datum::String(_) => None,
            other => other.as_f64(),
        }
        .ok_or_else(|| OracleError::NotNumeric {
            function: "spread".to_string(),
            value: value.to_string(),
        })?;
        range = Some(match range {
            None => (v, v),
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
        });
    }
    Ok(range.map(|(lo, hi)| hi - lo).unwrap_or(0.0))
}

/// `substr(s, pos[, len])`: 1-indexed character slice
///
/// NULL input yields NULL. A start past the end yields the empty string.
/// `pos < 1` is rejected by the server and therefore has no oracle value.
pub fn substr(input: Evaluated, pos: i64, len: Option<i64>) -> OracleResult<Evaluated> {
    if pos < 1 {
        return Err(invalid(format!("position {} is before the first character", pos)));
    }
    let len = match len {
        Some(l) if l < 0 => return Err(invalid(format!("negative length {}", l))),
        Some(l) => Some(usize::try_from(l).map_err(|_| invalid(format!("length {}", l)))?),
        None => None,
    };
    let skip = usize::try_from(pos - 1).map_err(|_| invalid(format!("position {}", pos)))?;

    match input {
        Evaluated::Exact(Datum::Null) => Ok(Evaluated::Exact(Datum::Null)),
        Evaluated::Exact(Datum::String(s)) => {
            let rest = s.chars().skip(skip);
            let sliced: String = match len {
                Some(l) => rest.take(l).collect(),
                None => rest.collect(),
            };
            Ok(Evaluated::Exact(Datum::String(sliced)))
        }
        Evaluated::Exact(other) => Err(OracleError::NotText {
            function: "substr".to_string(),
            value: other.to_string(),
        }),
        Evaluated::Opaque { null, max_chars } => {
            let remaining = max_chars.saturating_sub(skip);
            Ok(Evaluated::Opaque {
                null,
                max_chars: len.map_or(remaining, |l| l.min(remaining)),
            })
        }
    }
}

fn invalid(message: String) -> OracleError {
    OracleError::InvalidArgument {
        function: "substr".to_string(),
        message,
    }
}
