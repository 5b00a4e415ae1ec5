//! Deterministic row generation
//!
//! Every value is a pure function of the table schema, the row count, the
//! base timestamp, and the row index, so the oracle can recompute expected
//! results without ever asking the server what it stored.
//!
//! Row layout for `generate_rows(table, count, base)`:
//! - indices `0..count`: regular rows shaped by the [`ValueProfile`]
//! - then, if enabled, one row at every numeric type's minimum and one at its maximum
//! - then `null_rows` rows with every nullable column set to NULL

use crate::catalog::{DataType, SchemaError, SchemaResult, TableDef, TableKind};
use crate::value::text::{fit_bytes, fit_chars};
use crate::value::{Datum, Row};

/// One day in milliseconds
pub const DAY_MS: i64 = 86_400_000;

/// How regular rows derive their values from the row index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueProfile {
    /// Integers `i + 1`, floats `i + 0.1`, text `taosdata{i+1}`
    Sequential,
    /// Per-type multiples of `i`, text `binary{i}`
    Scaled,
    /// `Scaled` with signed values negated
    Negated,
}

/// How primary timestamps are spaced around the base timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampLayout {
    /// `base + i * step`
    Ascending { step_ms: i64 },
    /// `base - i * step`
    Descending { step_ms: i64 },
    /// Alternates above and below the base, so inserts arrive out of order
    Mixed { step_ms: i64 },
}

impl TimestampLayout {
    /// Primary timestamp for the row at `index`; unique per index for any positive step
    ///
    /// `None` when the timestamp falls outside the `i64` millisecond range.
    pub fn timestamp(&self, base_ts: i64, index: usize) -> Option<i64> {
        let i = i64::try_from(index).ok()?;
        match *self {
            TimestampLayout::Ascending { step_ms } => base_ts.checked_add(i.checked_mul(step_ms)?),
            TimestampLayout::Descending { step_ms } => base_ts.checked_sub(i.checked_mul(step_ms)?),
            TimestampLayout::Mixed { step_ms } => {
                if i % 2 == 0 {
                    base_ts.checked_add((i / 2).checked_mul(step_ms)?)
                } else {
                    base_ts.checked_sub(((i + 1) / 2).checked_mul(step_ms)?)
                }
            }
        }
    }
}

/// Generator settings
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub profile: ValueProfile,
    pub layout: TimestampLayout,
    /// Append a type-minimum row and a type-maximum row
    pub boundary_rows: bool,
    /// Number of all-null rows to append
    pub null_rows: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            profile: ValueProfile::Scaled,
            layout: TimestampLayout::Ascending { step_ms: 1_000 },
            boundary_rows: true,
            null_rows: 1,
        }
    }
}

/// Rows generated for one table
#[derive(Debug, Clone)]
pub struct Dataset {
    pub table: TableDef,
    pub rows: Vec<Row>,
}

impl Dataset {
    /// An empty dataset for a table that receives no rows
    pub fn empty(table: TableDef) -> Self {
        Self {
            table,
            rows: Vec::new(),
        }
    }

    /// Append rows, e.g. a second insert phase into the same table
    pub fn extend(&mut self, rows: Vec<Row>) {
        self.rows.extend(rows);
    }
}

/// Deterministic row generator
#[derive(Debug, Clone, Default)]
pub struct DataGenerator {
    config: GeneratorConfig,
}

impl DataGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Total rows produced for `count` regular rows
    pub fn total_rows(&self, count: usize) -> usize {
        count + if self.config.boundary_rows { 2 } else { 0 } + self.config.null_rows
    }

    /// Generate the full row set for a table
    pub fn generate_rows(&self, table: &TableDef, count: usize, base_ts: i64) -> SchemaResult<Vec<Row>> {
        (0..self.total_rows(count))
            .map(|index| self.row_at(table, count, base_ts, index))
            .collect()
    }

    /// Generate a dataset, keeping the table definition alongside its rows
    pub fn generate(&self, table: &TableDef, count: usize, base_ts: i64) -> SchemaResult<Dataset> {
        Ok(Dataset {
            table: table.clone(),
            rows: self.generate_rows(table, count, base_ts)?,
        })
    }

    /// The row at `index` of the row set for `count` regular rows
    ///
    /// Fails when the layout pushes the primary timestamp out of range.
    pub fn row_at(&self, table: &TableDef, count: usize, base_ts: i64, index: usize) -> SchemaResult<Row> {
        let ts = self
            .config
            .layout
            .timestamp(base_ts, index)
            .ok_or_else(|| SchemaError::TimestampOverflow {
                table: table.name.clone(),
                index,
            })?;
        let ts = Datum::Timestamp(ts);
        let boundary = if self.config.boundary_rows { 2 } else { 0 };

        let values = table.data_columns().iter().map(|col| {
            let ty = col.data_type;
            if index < count {
                regular_value(self.config.profile, ty, index, base_ts)
            } else if index < count + boundary {
                boundary_value(ty, index == count, base_ts)
            } else {
                Datum::Null
            }
        });

        Ok(Row::new(std::iter::once(ts).chain(values).collect()))
    }

    /// Render INSERT statements for `rows`, `batch` rows per statement
    ///
    /// Rows go into ordinary tables or subtables; super-tables hold no rows of
    /// their own.
    pub fn insert_statements(table: &TableDef, rows: &[Row], batch: usize) -> Vec<String> {
        if matches!(table.kind, TableKind::Super { .. }) {
            return Vec::new();
        }
        rows.chunks(batch.max(1))
            .map(|chunk| {
                let values: Vec<String> = chunk
                    .iter()
                    .map(|row| {
                        let cells: Vec<String> = row.iter().map(Datum::to_sql_literal).collect();
                        format!("({})", cells.join(", "))
                    })
                    .collect();
                format!("insert into {} values {}", table.qualified_name(), values.join(" "))
            })
            .collect()
    }
}

fn regular_value(profile: ValueProfile, ty: DataType, index: usize, base_ts: i64) -> Datum {
    let i = index as i64;
    match ty {
        DataType::Bool => Datum::Bool(i % 2 == 1),
        DataType::Timestamp => Datum::Timestamp(base_ts.saturating_add(i)),
        DataType::Binary(n) => {
            let text = match profile {
                ValueProfile::Sequential => format!("taosdata{}", i + 1),
                _ => format!("binary{}", i),
            };
            Datum::String(fit_bytes(text, n as usize))
        }
        DataType::NChar(n) => {
            let text = match profile {
                ValueProfile::Sequential => format!("涛思数据{}", i + 1),
                _ => format!("nchar_测试_{}", i),
            };
            Datum::String(fit_chars(text, n as usize))
        }
        DataType::Float | DataType::Double => {
            let value = match profile {
                ValueProfile::Sequential => i as f64 + 0.1,
                ValueProfile::Scaled => float_scale(ty) * i as f64,
                ValueProfile::Negated => -float_scale(ty) * i as f64,
            };
            float_datum(ty, value)
        }
        _ => {
            let magnitude = match profile {
                ValueProfile::Sequential => i + 1,
                ValueProfile::Scaled | ValueProfile::Negated => int_scale(ty, i),
            };
            let negate = profile == ValueProfile::Negated && !ty.is_unsigned();
            int_datum(ty, if negate { -magnitude } else { magnitude })
        }
    }
}

fn boundary_value(ty: DataType, minimum: bool, base_ts: i64) -> Datum {
    let extreme = if minimum { ty.min_value() } else { ty.max_value() };
    if let Some(value) = extreme {
        return value;
    }
    let suffix = if minimum { 1 } else { 2 };
    match ty {
        DataType::Bool => Datum::Bool(!minimum),
        DataType::Binary(n) => {
            Datum::String(fit_bytes(format!("binary_limit-{}", suffix), n as usize))
        }
        DataType::NChar(n) => {
            Datum::String(fit_chars(format!("nchar_测试_limit-{}", suffix), n as usize))
        }
        DataType::Timestamp => Datum::Timestamp(base_ts.saturating_sub(suffix * DAY_MS)),
        _ => Datum::Null,
    }
}

fn int_scale(ty: DataType, i: i64) -> i64 {
    match ty {
        DataType::TinyInt => 11 * i % 127,
        DataType::SmallInt => 111 * i % 32767,
        DataType::UTinyInt => 11 * i % 255,
        DataType::USmallInt => 111 * i % 65535,
        DataType::BigInt | DataType::UBigInt => 11111 * i,
        _ => i,
    }
}

fn float_scale(ty: DataType) -> f64 {
    if ty == DataType::Float {
        1.11
    } else {
        1100.0011
    }
}

/// Wrap an integer into the representable range of `ty`
fn int_datum(ty: DataType, value: i64) -> Datum {
    let (lo, hi): (i128, i128) = match (ty.min_value(), ty.max_value()) {
        (Some(Datum::Int(lo)), Some(Datum::Int(hi))) => (lo.into(), hi.into()),
        (Some(Datum::UInt(lo)), Some(Datum::UInt(hi))) => (lo.into(), hi.into()),
        _ => (i64::MIN.into(), i64::MAX.into()),
    };
    let span = hi - lo + 1;
    let wrapped = (i128::from(value) - lo).rem_euclid(span) + lo;
    if ty.is_unsigned() {
        Datum::UInt(wrapped as u64)
    } else {
        Datum::Int(wrapped as i64)
    }
}

/// Single-precision columns hold the f32-rounded value
fn float_datum(ty: DataType, value: f64) -> Datum {
    if ty == DataType::Float {
        Datum::Float(f64::from(value as f32))
    } else {
        Datum::Float(value)
    }
}
